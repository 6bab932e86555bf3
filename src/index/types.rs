use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The five artifact streams derived from every unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Tokens,
    Meta,
    Sources,
    Typesinfo,
    Comments,
}

impl IndexKind {
    /// All kinds, in the order records are appended for each file
    pub const ALL: [IndexKind; 5] = [
        IndexKind::Tokens,
        IndexKind::Meta,
        IndexKind::Sources,
        IndexKind::Comments,
        IndexKind::Typesinfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Tokens => "tokens",
            IndexKind::Meta => "meta",
            IndexKind::Sources => "sources",
            IndexKind::Typesinfo => "typesinfo",
            IndexKind::Comments => "comments",
        }
    }

    /// Name of the local staging file for this kind
    pub fn staging_file_name(&self) -> String {
        format!("{}.jsonl", self.as_str())
    }

    /// Position in [`IndexKind::ALL`]
    pub fn index(&self) -> usize {
        match self {
            IndexKind::Tokens => 0,
            IndexKind::Meta => 1,
            IndexKind::Sources => 2,
            IndexKind::Comments => 3,
            IndexKind::Typesinfo => 4,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common line format for the tokens, meta, sources and comments streams.
///
/// `index_kind` carries the language tag (e.g. `java`), `record_kind` the
/// stream the line belongs to.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEnvelope<'a, P: Serialize> {
    pub index_kind: &'a str,
    pub record_kind: IndexKind,
    pub payload: P,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_location: Option<&'a str>,
}

/// Payload of a `sources` line
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord<'a> {
    pub owner_login: &'a str,
    pub repo_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_location: Option<&'a str>,
    pub content: &'a str,
}

/// Payload of a `comments` line
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentsRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_location: Option<&'a str>,
    pub comments: &'a Value,
}
