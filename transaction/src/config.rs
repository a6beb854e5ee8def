use std::path::Path;

use redlilium_core::abstract_editor::DEFAULT_MAX_UNDO;
use serde::Deserialize;

/// Per-editor settings of a [`TransactionContext`](crate::TransactionContext).
///
/// Editors usually embed these as an `[undo]` table in their project file:
///
/// ```toml
/// [undo]
/// max_undo = 250
/// default_edit_name = "Edit Node"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionConfig {
    /// Undo depth. Older entries are evicted and their trashed entities
    /// destroyed.
    #[serde(default = "default_max_undo")]
    pub max_undo: usize,
    /// Menu label for field edits opened with `on_pre_edit`.
    #[serde(default = "default_edit_name")]
    pub default_edit_name: String,
}

fn default_max_undo() -> usize {
    DEFAULT_MAX_UNDO
}

fn default_edit_name() -> String {
    "Edit Properties".into()
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_undo: default_max_undo(),
            default_edit_name: default_edit_name(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    undo: TransactionConfig,
}

impl TransactionConfig {
    /// Reads the `[undo]` table of a TOML document. A missing table yields
    /// the defaults; other tables are ignored.
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str::<ConfigFile>(content)
            .map(|file| file.undo)
            .map_err(|e| format!("failed to parse undo config: {e}"))
    }

    /// Loads the `[undo]` table from a TOML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_toml_str(&content).map_err(|e| format!("{}: {e}", path.display()))
    }
}
