use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An account/profile the engine can be pointed at: which remote to sync
/// and where the working copy lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub repo_url: String,
    pub code_directory: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        repo_url: impl Into<String>,
        code_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            repo_url: repo_url.into(),
            code_directory: code_directory.into(),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}
