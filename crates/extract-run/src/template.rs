//! Output column template (spec §9 Design Note): columns accumulate during
//! the pull phase as new metafield keys, translation locale/key pairs, and
//! split variant-option names are discovered; `seal` freezes the set just
//! before the header row is emitted so every subsequent data row lines up
//! with it.

use std::collections::HashMap;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct OutputTemplate {
    columns: Vec<String>,
    seen: HashSet<String>,
    sealed: bool,
}

impl OutputTemplate {
    #[must_use]
    pub fn new(base_columns: Vec<String>) -> Self {
        let seen = base_columns.iter().cloned().collect();
        Self {
            columns: base_columns,
            seen,
            sealed: false,
        }
    }

    /// Appends `name` if not already present. A no-op once sealed — columns
    /// discovered after the header row is written would desync every row
    /// already emitted, so discovery must finish before `seal`.
    pub fn ensure_column(&mut self, name: &str) {
        if self.sealed || self.seen.contains(name) {
            return;
        }
        self.seen.insert(name.to_string());
        self.columns.push(name.to_string());
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Renders `values` against the sealed column order, substituting an
    /// empty cell for any column the row has nothing to say about.
    #[must_use]
    pub fn render_row(&self, values: &HashMap<String, String>) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| values.get(c).cloned().unwrap_or_default())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_column_is_idempotent_and_ordered() {
        let mut template = OutputTemplate::new(vec!["id".to_string()]);
        template.ensure_column("custom_color");
        template.ensure_column("id");
        template.ensure_column("custom_size");
        assert_eq!(template.columns(), &["id", "custom_color", "custom_size"]);
    }

    #[test]
    fn ensure_column_is_noop_after_seal() {
        let mut template = OutputTemplate::new(vec!["id".to_string()]);
        template.seal();
        template.ensure_column("late");
        assert_eq!(template.columns(), &["id"]);
        assert!(template.is_sealed());
    }

    #[test]
    fn render_row_fills_missing_columns_with_empty_string() {
        let mut template = OutputTemplate::new(vec!["id".to_string(), "title".to_string()]);
        template.seal();
        let mut values = HashMap::new();
        values.insert("id".to_string(), "1".to_string());
        assert_eq!(template.render_row(&values), vec!["1".to_string(), String::new()]);
    }
}
