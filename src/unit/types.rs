use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::UnitKeyError;
use crate::index::types::IndexKind;

/// Separator between owner login and repository name in unit keys
pub const KEY_SEPARATOR: char = '~';

/// Characters never allowed in an owner login or repository name
const RESERVED_CHARS: [char; 4] = ['/', '\\', '\0', KEY_SEPARATOR];

/// Identity of a repository unit, rendered as `owner~repo`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub owner_login: String,
    pub repo_name: String,
}

impl UnitKey {
    pub fn new(owner_login: impl Into<String>, repo_name: impl Into<String>) -> Self {
        Self {
            owner_login: owner_login.into(),
            repo_name: repo_name.into(),
        }
    }

    /// Check that both parts are usable as a single path component.
    ///
    /// Staging and durable paths are built from the key, so a valid key maps
    /// to exactly one directory name under each root.
    pub fn validate(&self) -> Result<(), UnitKeyError> {
        validate_component("owner_login", &self.owner_login)?;
        validate_component("repo_name", &self.repo_name)
    }

    /// Durable location of one artifact kind for this unit:
    /// `{base}/{language}/{kind}/{owner}~{repo}`
    pub fn durable_path(&self, base_path: &Path, language: &str, kind: IndexKind) -> PathBuf {
        base_path
            .join(language)
            .join(kind.as_str())
            .join(self.to_string())
    }
}

fn validate_component(field: &'static str, value: &str) -> Result<(), UnitKeyError> {
    if value.is_empty() {
        return Err(UnitKeyError::Empty { field });
    }
    if value == "." || value == ".." {
        return Err(UnitKeyError::RelativeComponent {
            field,
            value: value.to_string(),
        });
    }
    if let Some(ch) = value.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(UnitKeyError::ReservedChar {
            field,
            value: value.to_string(),
            ch,
        });
    }
    Ok(())
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.owner_login, KEY_SEPARATOR, self.repo_name)
    }
}

/// One processable file and the facts extracted from it.
///
/// Payloads are opaque: they are produced upstream and only routed and
/// serialized here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_location: Option<String>,
    #[serde(default)]
    pub searchable_refs: Value,
    #[serde(default)]
    pub file_meta_data: Value,
    #[serde(default)]
    pub source_content: String,
    #[serde(default)]
    pub doc_comments: Value,
    #[serde(default)]
    pub type_facts: Value,
}

/// One repository's worth of files, the unit of work for a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryUnit {
    pub owner_login: String,
    pub repo_name: String,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    /// Clone or extraction directory left behind by upstream stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
}

impl RepositoryUnit {
    pub fn new(owner_login: impl Into<String>, repo_name: impl Into<String>) -> Self {
        Self {
            owner_login: owner_login.into(),
            repo_name: repo_name.into(),
            files: Vec::new(),
            workdir: None,
        }
    }

    pub fn with_files(mut self, files: Vec<FileRecord>) -> Self {
        self.files = files;
        self
    }

    pub fn with_workdir(mut self, workdir: PathBuf) -> Self {
        self.workdir = Some(workdir);
        self
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.owner_login.clone(), self.repo_name.clone())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}
