use tracing::debug;
use uuid::Uuid;

/// Which half of a hovered column the pointer is over during a column drag.
/// Left half inserts before the hovered column, right half after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverHalf {
    Left,
    Right,
}

/// Drag interaction state. Exactly one drag may be active at a time; while a
/// column drag is live, card-level drops are suppressed so a drop is never
/// ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Card {
        lead: Uuid,
        over: Option<String>,
    },
    Column {
        column: String,
        insert_at: Option<usize>,
    },
}

impl DragState {
    pub fn is_idle(&self) -> bool {
        matches!(self, DragState::Idle)
    }

    pub fn dragging_card(&self) -> Option<Uuid> {
        match self {
            DragState::Card { lead, .. } => Some(*lead),
            _ => None,
        }
    }

    pub fn dragging_column(&self) -> Option<&str> {
        match self {
            DragState::Column { column, .. } => Some(column),
            _ => None,
        }
    }

    pub fn hovered_column(&self) -> Option<&str> {
        match self {
            DragState::Card { over, .. } => over.as_deref(),
            _ => None,
        }
    }

    pub fn column_insert_at(&self) -> Option<usize> {
        match self {
            DragState::Column { insert_at, .. } => *insert_at,
            _ => None,
        }
    }

    pub fn start_card(&mut self, lead: Uuid) {
        if !self.is_idle() {
            debug!("drag already active; ignoring card drag start");
            return;
        }
        *self = DragState::Card { lead, over: None };
    }

    pub fn card_over(&mut self, column_id: &str) {
        if let DragState::Card { over, .. } = self {
            *over = Some(column_id.to_string());
        }
    }

    /// `leave` clears the transient hover target without side effects.
    pub fn card_leave(&mut self) {
        if let DragState::Card { over, .. } = self {
            *over = None;
        }
    }

    /// Completes a card drag. Returns the dragged lead, or `None` when no
    /// card drag is active — in particular while a column drag is live.
    pub fn drop_card(&mut self) -> Option<Uuid> {
        match std::mem::take(self) {
            DragState::Card { lead, .. } => Some(lead),
            other => {
                *self = other;
                None
            }
        }
    }

    pub fn start_column(&mut self, column_id: &str) {
        if !self.is_idle() {
            debug!("drag already active; ignoring column drag start");
            return;
        }
        *self = DragState::Column {
            column: column_id.to_string(),
            insert_at: None,
        };
    }

    pub fn column_over(&mut self, column_index: usize, half: HoverHalf) {
        if let DragState::Column { insert_at, .. } = self {
            *insert_at = Some(match half {
                HoverHalf::Left => column_index,
                HoverHalf::Right => column_index + 1,
            });
        }
    }

    /// Completes a column drag, yielding the dragged id and the insertion
    /// index. A drop with no recorded hover target is a cancellation.
    pub fn drop_column(&mut self) -> Option<(String, usize)> {
        match std::mem::take(self) {
            DragState::Column {
                column,
                insert_at: Some(index),
            } => Some((column, index)),
            DragState::Column { insert_at: None, .. } => None,
            other => {
                *self = other;
                None
            }
        }
    }

    /// Resets all transient drag state with no mutation.
    pub fn cancel(&mut self) {
        *self = DragState::Idle;
    }
}
