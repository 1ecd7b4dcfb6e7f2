use tracing::{debug, warn};

use crate::column::{Column, ColumnCatalog};

/// Locally persisted column ordering. The server has no say in it: the list
/// is reconciled against whatever columns are currently known.
///
/// Invariant: after `sync`, every known column id appears exactly once —
/// stale ids are dropped, new ids are appended.
#[derive(Debug, Clone, Default)]
pub struct ColumnOrder {
    ids: Vec<String>,
}

impl ColumnOrder {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn sync(&mut self, known: &[String]) {
        self.ids.retain(|id| known.contains(id));
        for id in known {
            if !self.ids.contains(id) {
                self.ids.push(id.clone());
            }
        }
    }

    /// Moves `moved_id` so it lands at `target_index` in the pre-removal
    /// indexing, with the classic splice correction when the removal happened
    /// before the target.
    pub fn reorder(&mut self, moved_id: &str, target_index: usize) {
        let Some(from) = self.ids.iter().position(|id| id == moved_id) else {
            warn!(moved_id, "column not present in order");
            return;
        };
        if from == target_index {
            return;
        }

        let id = self.ids.remove(from);
        let adjusted = if from < target_index {
            target_index - 1
        } else {
            target_index
        };
        let adjusted = adjusted.min(self.ids.len());
        debug!(moved_id, from, target_index, adjusted, "reordered column");
        self.ids.insert(adjusted, id);
    }

    /// Maps the persisted id order onto the live column set, silently
    /// dropping ids that no longer resolve.
    pub fn ordered(&self, catalog: &ColumnCatalog) -> Vec<Column> {
        let all = catalog.all();
        self.ids
            .iter()
            .filter_map(|id| all.iter().find(|column| &column.id == id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ColumnOrder;
    use crate::column::{Column, ColumnCatalog};

    fn order_of(ids: &[&str]) -> ColumnOrder {
        ColumnOrder::new(ids.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn sync_drops_stale_and_appends_new() {
        let mut order = order_of(&["won", "ghost", "new"]);
        let known = vec!["new".to_string(), "won".to_string(), "lost".to_string()];
        order.sync(&known);
        assert_eq!(order.ids(), ["won", "new", "lost"]);
    }

    #[test]
    fn ordered_is_a_permutation_of_known_ids() {
        let catalog = ColumnCatalog::default();
        let mut order = ColumnOrder::default();
        order.sync(&catalog.known_ids());
        order.reorder("lost", 0);
        order.reorder("new", 4);

        let mut seen: Vec<String> = order.ordered(&catalog).into_iter().map(|c| c.id).collect();
        assert_eq!(seen.len(), catalog.known_ids().len());
        seen.sort();
        let mut known = catalog.known_ids();
        known.sort();
        assert_eq!(seen, known);
    }

    #[test]
    fn reorder_round_trips() {
        let mut order = order_of(&["a", "b", "c", "d"]);
        let original = order.ids().to_vec();

        // Move c before a, then back after b: inverse targets restore order.
        order.reorder("c", 0);
        assert_eq!(order.ids(), ["c", "a", "b", "d"]);
        order.reorder("c", 3);
        assert_eq!(order.ids(), original);
    }

    #[test]
    fn reorder_to_own_position_is_a_noop() {
        let mut order = order_of(&["a", "b", "c"]);
        order.reorder("b", 1);
        assert_eq!(order.ids(), ["a", "b", "c"]);
        order.reorder("missing", 0);
        assert_eq!(order.ids(), ["a", "b", "c"]);
    }

    #[test]
    fn dropping_column_on_left_half_of_first_column() {
        // Column at index 2 dropped on the left half of index 0.
        let mut order = order_of(&["a", "b", "c", "d"]);
        order.reorder("c", 0);
        assert_eq!(order.ids(), ["c", "a", "b", "d"]);
    }

    #[test]
    fn ordered_skips_unresolvable_ids() {
        let mut catalog = ColumnCatalog::default();
        catalog
            .add(Column::custom("extra", "Extra", "border-slate-400"))
            .expect("add");
        let order = order_of(&["extra", "phantom", "new"]);
        let titles: Vec<String> = order.ordered(&catalog).into_iter().map(|c| c.id).collect();
        assert_eq!(titles, ["extra", "new"]);
    }
}
