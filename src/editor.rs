// src/editor.rs

/// How the configured editor name is compared with a changeset's `created_by` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MatchMode {
    /// Tag starts with the editor name ("OpenStop" matches "OpenStop 1.2.0")
    #[default]
    #[value(name = "prefix")]
    Prefix,
    #[value(name = "contains")]
    Contains,
    #[value(name = "exact")]
    Exact,
}

/// Decides whether a changeset belongs to the target editor
#[derive(Debug, Clone, Default)]
pub struct EditorFilter {
    editor: String,
    mode: MatchMode,
}

impl EditorFilter {
    pub fn new(editor: impl Into<String>, mode: MatchMode) -> Self {
        EditorFilter {
            editor: editor.into(),
            mode,
        }
    }

    pub fn editor(&self) -> &str {
        &self.editor
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// An empty editor name accepts everything, including changesets without the tag.
    pub fn matches(&self, created_by: &str) -> bool {
        match self.mode {
            MatchMode::Prefix => created_by.starts_with(&self.editor),
            MatchMode::Contains => created_by.contains(&self.editor),
            MatchMode::Exact => self.editor.is_empty() || created_by == self.editor,
        }
    }

    pub fn matches_untagged(&self) -> bool {
        self.editor.is_empty()
    }
}
