use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An uploaded policy document and its extraction state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub file_id: String,
    pub path: PathBuf,
    /// e.g. "auto", "home"
    pub policy_type: String,
    /// Display name; selection matches on this exactly.
    pub print_name: String,
    pub carrier: String,
    /// e.g. "pdf", "txt"
    pub format: String,
    #[serde(default)]
    pub is_extracted: bool,
    #[serde(default)]
    pub extracted_file_path: Option<PathBuf>,
    #[serde(default)]
    pub additional_metadata: Option<BTreeMap<String, String>>,
}

impl Policy {
    pub fn mark_extracted(&mut self, text_path: &Path) {
        self.extracted_file_path = Some(text_path.to_path_buf());
        self.is_extracted = true;
    }

    /// Extracted text location, only once extraction has completed.
    pub fn extracted_text(&self) -> Option<&Path> {
        if self.is_extracted {
            self.extracted_file_path.as_deref()
        } else {
            None
        }
    }
}
