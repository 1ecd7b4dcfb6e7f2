use anyhow::bail;
use serde::{Deserialize, Serialize};

/// A board column. Predefined and custom columns share one id namespace so
/// lead references survive a column being customized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
    pub color: String,

    #[serde(default)]
    pub dot_color: String,

    #[serde(default)]
    pub is_custom: bool,
}

impl Column {
    pub fn custom(id: impl Into<String>, title: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            color: color.into(),
            dot_color: String::new(),
            is_custom: true,
        }
    }
}

fn builtin(id: &str, title: &str, color: &str, dot_color: &str) -> Column {
    Column {
        id: id.to_string(),
        title: title.to_string(),
        color: color.to_string(),
        dot_color: dot_color.to_string(),
        is_custom: false,
    }
}

pub fn predefined() -> Vec<Column> {
    vec![
        builtin("new", "New Lead", "border-blue-400", "bg-blue-400"),
        builtin("contacted", "Contacted", "border-teal-400", "bg-teal-400"),
        builtin("visit_pending", "Visit Pending", "border-yellow-400", "bg-yellow-400"),
        builtin("quote_generated", "Quote Drafted", "border-indigo-400", "bg-indigo-400"),
        builtin("quote_sent", "Quote Sent", "border-purple-400", "bg-purple-400"),
        builtin("negotiation", "In Negotiation", "border-orange-400", "bg-orange-400"),
        builtin("won", "Won", "border-green-500", "bg-green-500"),
        builtin("lost", "Lost", "border-red-300", "bg-red-300"),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct ColumnPatch {
    pub title: Option<String>,
    pub color: Option<String>,
    pub dot_color: Option<String>,
}

/// The live column set: the predefined columns, overridden by any custom
/// column sharing the same id, plus purely custom columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnCatalog {
    custom: Vec<Column>,
}

impl ColumnCatalog {
    pub fn new(custom: Vec<Column>) -> Self {
        Self { custom }
    }

    pub fn custom_columns(&self) -> &[Column] {
        &self.custom
    }

    pub fn all(&self) -> Vec<Column> {
        let mut columns: Vec<Column> = predefined()
            .into_iter()
            .map(|column| {
                self.custom
                    .iter()
                    .find(|candidate| candidate.id == column.id)
                    .cloned()
                    .unwrap_or(column)
            })
            .collect();

        for column in &self.custom {
            if !columns.iter().any(|existing| existing.id == column.id) {
                columns.push(column.clone());
            }
        }

        columns
    }

    pub fn get(&self, id: &str) -> Option<Column> {
        self.all().into_iter().find(|column| column.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn known_ids(&self) -> Vec<String> {
        self.all().into_iter().map(|column| column.id).collect()
    }

    pub fn add(&mut self, mut column: Column) -> anyhow::Result<()> {
        if column.id.trim().is_empty() {
            bail!("a column needs an id");
        }
        if self.contains(&column.id) {
            bail!("column id already in use: {}", column.id);
        }
        column.is_custom = true;
        self.custom.push(column);
        Ok(())
    }

    /// Editing a predefined column promotes it into a custom column under the
    /// same id, so every lead pointing at the id keeps resolving.
    pub fn update(&mut self, id: &str, patch: ColumnPatch) -> anyhow::Result<()> {
        if let Some(column) = self.custom.iter_mut().find(|column| column.id == id) {
            apply_patch(column, patch);
            return Ok(());
        }

        let Some(mut column) = predefined().into_iter().find(|column| column.id == id) else {
            bail!("unknown column: {id}");
        };
        apply_patch(&mut column, patch);
        column.is_custom = true;
        self.custom.push(column);
        Ok(())
    }

    /// Removes a custom column. Dropping the override of a predefined id
    /// resurfaces the predefined definition; built-in columns without an
    /// override cannot be removed.
    pub fn remove(&mut self, id: &str) -> anyhow::Result<()> {
        let before = self.custom.len();
        self.custom.retain(|column| column.id != id);
        if self.custom.len() == before {
            if predefined().iter().any(|column| column.id == id) {
                bail!("built-in column cannot be removed: {id}");
            }
            bail!("unknown column: {id}");
        }
        Ok(())
    }
}

fn apply_patch(column: &mut Column, patch: ColumnPatch) {
    if let Some(title) = patch.title {
        column.title = title;
    }
    if let Some(color) = patch.color {
        column.color = color;
    }
    if let Some(dot_color) = patch.dot_color {
        column.dot_color = dot_color;
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, ColumnCatalog, ColumnPatch, predefined};

    #[test]
    fn editing_a_predefined_column_keeps_its_id() {
        let mut catalog = ColumnCatalog::default();
        catalog
            .update(
                "contacted",
                ColumnPatch {
                    title: Some("Reached Out".to_string()),
                    ..ColumnPatch::default()
                },
            )
            .expect("promote");

        let column = catalog.get("contacted").expect("still resolvable");
        assert_eq!(column.title, "Reached Out");
        assert!(column.is_custom);
        assert_eq!(catalog.known_ids().len(), predefined().len());
    }

    #[test]
    fn removing_an_override_resurfaces_the_builtin() {
        let mut catalog = ColumnCatalog::default();
        catalog
            .update(
                "won",
                ColumnPatch {
                    title: Some("Closed".to_string()),
                    ..ColumnPatch::default()
                },
            )
            .expect("promote");
        catalog.remove("won").expect("drop override");

        let column = catalog.get("won").expect("builtin back");
        assert_eq!(column.title, "Won");
        assert!(!column.is_custom);
        assert!(catalog.remove("won").is_err());
    }

    #[test]
    fn custom_columns_extend_the_namespace() {
        let mut catalog = ColumnCatalog::default();
        catalog
            .add(Column::custom("waiting_pool", "Waiting Pool", "border-slate-400"))
            .expect("add");
        assert!(catalog.contains("waiting_pool"));
        assert!(catalog.add(Column::custom("waiting_pool", "Dup", "x")).is_err());

        catalog.remove("waiting_pool").expect("remove custom");
        assert!(!catalog.contains("waiting_pool"));
    }
}
