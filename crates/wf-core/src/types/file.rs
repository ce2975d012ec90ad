use crate::types::enums::OperationKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
    pub language: String,
    pub revision: u32,
}

impl ProjectFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let language = language_for_path(&path).to_string();
        Self {
            path,
            content: content.into(),
            language,
            revision: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Operation {
    pub path: String,
    pub content: Option<String>,
    pub kind: OperationKind,
    pub at: DateTime<Utc>,
}

impl Operation {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            kind: OperationKind::Create,
            at: Utc::now(),
        }
    }

    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            kind: OperationKind::Update,
            at: Utc::now(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            kind: OperationKind::Delete,
            at: Utc::now(),
        }
    }
}

/// Complete materialized file set at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Snapshot {
    pub version: u32,
    pub at: DateTime<Utc>,
    pub files: BTreeMap<String, ProjectFile>,
    pub message: String,
}

impl Snapshot {
    pub fn initial() -> Self {
        Self {
            version: 0,
            at: Utc::now(),
            files: BTreeMap::new(),
            message: "initial".to_string(),
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    pub fn get(&self, path: &str) -> Option<&ProjectFile> {
        self.files.get(path)
    }
}

pub fn language_for_path(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "tsx" | "ts" => "typescript",
        "jsx" | "js" | "mjs" | "cjs" => "javascript",
        "css" => "css",
        "html" | "htm" => "html",
        "json" => "json",
        "md" | "mdx" => "markdown",
        "svg" => "svg",
        _ => "plaintext",
    }
}
