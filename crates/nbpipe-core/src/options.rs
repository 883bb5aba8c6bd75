use serde::{Deserialize, Serialize};

/// What to keep and how to render it. Deserializes from the camelCase wire form; absent keys
/// take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionOptions {
    pub include_code: bool,
    pub include_markdown: bool,
    pub include_raw: bool,
    /// Render execution outputs under code cells (only file/API-resolved cells carry any).
    pub include_outputs: bool,
    pub skip_empty: bool,
    pub selection_mode: bool,
    /// Indices into the notebook's cells, replayed in this order. Out-of-range entries are
    /// dropped.
    pub selected_cells: Vec<i64>,
    /// Prefix raw cells with an HTML comment so they can be told apart from markdown.
    pub mark_raw_cells: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            include_code: true,
            include_markdown: true,
            include_raw: true,
            include_outputs: true,
            skip_empty: true,
            selection_mode: false,
            selected_cells: Vec::new(),
            mark_raw_cells: false,
        }
    }
}

impl ExtractionOptions {
    /// The explicit selection, when it overrides type/emptiness filtering.
    pub fn selection(&self) -> Option<&[i64]> {
        (self.selection_mode && !self.selected_cells.is_empty())
            .then_some(self.selected_cells.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_wire_options_keep_defaults() {
        let o: ExtractionOptions =
            serde_json::from_str(r#"{"includeCode": false, "selectedCells": [2, 0]}"#).unwrap();
        assert!(!o.include_code);
        assert!(o.include_markdown);
        assert!(o.include_raw);
        assert!(o.skip_empty);
        assert_eq!(o.selected_cells, vec![2, 0]);
        // Selection only overrides when selection mode is on.
        assert!(o.selection().is_none());
    }

    #[test]
    fn selection_requires_mode_and_indices() {
        let mut o = ExtractionOptions {
            selection_mode: true,
            ..Default::default()
        };
        assert!(o.selection().is_none());
        o.selected_cells = vec![1];
        assert_eq!(o.selection(), Some(&[1][..]));
    }
}
