use crate::error::InputError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable identifier of an analysed document. Used verbatim as a file name
/// under the index directory, so it never contains path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Result<Self, InputError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(InputError::EmptyIdentifier);
        }
        if trimmed.contains(['/', '\\', '\0']) || trimmed.contains("..") {
            return Err(InputError::InvalidIdentifier(value));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(value: DocumentId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" | "mild" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "severe" | "critical" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Low,
    #[default]
    Normal,
    High,
}

impl TestStatus {
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" | "below" | "decreased" => Some(Self::Low),
            "normal" | "within range" | "in range" | "ok" => Some(Self::Normal),
            "high" | "above" | "elevated" | "increased" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub overall: String,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub value: String,
    pub unit: String,
    pub normal_range: String,
    pub status: TestStatus,
    pub interpretation: String,
}

/// What the analysis write path hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub document_id: DocumentId,
    pub summary: Summary,
    pub test_results: Vec<TestResult>,
    pub index_path: PathBuf,
    pub chunk_count: usize,
    pub missing_required_tests: Vec<String>,
}

/// Catalog entry kept per analysed document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub document_id: DocumentId,
    pub source_path: String,
    pub index_path: Option<PathBuf>,
    pub summary: Summary,
    pub test_results: Vec<TestResult>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    #[default]
    Answered,
    NoReports,
    NoEmbeddings,
    EmbeddingFileMissing,
    InvalidIndex,
    IndexLoadFailed,
    GatewayFailed,
}

/// Chat output. `answer` is always displayable; `kind` lets the caller tell
/// the failure conditions apart without string matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(skip)]
    pub kind: AnswerKind,
}

impl ChatAnswer {
    pub fn new(kind: AnswerKind, answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            kind,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.kind == AnswerKind::Answered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_rejects_empty_and_path_like_values() {
        assert_eq!(DocumentId::new("  "), Err(InputError::EmptyIdentifier));
        assert!(matches!(
            DocumentId::new("../etc/passwd"),
            Err(InputError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            DocumentId::new("a/b"),
            Err(InputError::InvalidIdentifier(_))
        ));
        assert_eq!(DocumentId::new(" apc ").map(|id| id.to_string()), Ok("apc".to_string()));
    }

    #[test]
    fn summary_serializes_in_camel_case() -> Result<(), serde_json::Error> {
        let summary = Summary {
            overall: "ok".to_string(),
            key_findings: vec!["a".to_string()],
            recommendations: Vec::new(),
            severity: Severity::Medium,
        };
        let value = serde_json::to_value(&summary)?;
        assert_eq!(value["keyFindings"][0], "a");
        assert_eq!(value["severity"], "medium");
        Ok(())
    }

    #[test]
    fn lenient_enum_parsing() {
        assert_eq!(Severity::parse_lenient(" HIGH "), Some(Severity::High));
        assert_eq!(Severity::parse_lenient("moderate"), Some(Severity::Medium));
        assert_eq!(Severity::parse_lenient("unknown"), None);
        assert_eq!(TestStatus::parse_lenient("Elevated"), Some(TestStatus::High));
        assert_eq!(TestStatus::parse_lenient(""), None);
    }
}
