use crate::gateway::{ChatMessage, ChatRequest, LlmGateway};
use crate::models::{Severity, Summary, TestResult, TestStatus};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

pub type ParsedObject = Map<String, Value>;

/// Model output that could not be read as a JSON object, kept as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawText(pub String);

/// A clinically significant test that should be surfaced whenever the
/// report contains it. Matching is a case-insensitive substring test
/// against any alias.
#[derive(Debug, Clone, Copy)]
pub struct RequiredTest {
    pub label: &'static str,
    pub aliases: &'static [&'static str],
}

pub const REQUIRED_TESTS: [RequiredTest; 6] = [
    RequiredTest {
        label: "Vitamin D",
        aliases: &["vitamin d"],
    },
    RequiredTest {
        label: "Hemoglobin",
        aliases: &["hemoglobin", "haemoglobin"],
    },
    RequiredTest {
        label: "White Blood Cell Count",
        aliases: &["white blood", "wbc"],
    },
    RequiredTest {
        label: "Total Cholesterol",
        aliases: &["cholesterol"],
    },
    RequiredTest {
        label: "Fasting Glucose",
        aliases: &["fasting glucose"],
    },
    RequiredTest {
        label: "TSH",
        aliases: &["tsh", "thyroid stimulating"],
    },
];

impl RequiredTest {
    fn matches(&self, text_lower: &str) -> bool {
        self.aliases.iter().any(|alias| text_lower.contains(alias))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessReport {
    /// Required tests absent from the extraction.
    pub missing: Vec<String>,
    /// The subset of `missing` whose name does appear in the source text.
    pub missing_but_mentioned: Vec<String>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Parsed,
    /// The reply was not JSON; the summary carries the raw text.
    Degraded,
    GatewayFailed(String),
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub summary: Summary,
    pub tests: Vec<TestResult>,
    pub outcome: ExtractionOutcome,
    pub completeness: CompletenessReport,
}

pub struct StructuredExtractor {
    gateway: LlmGateway,
    model: String,
    temperature: f32,
}

impl StructuredExtractor {
    pub fn new(gateway: LlmGateway, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Never fails: gateway errors and unreadable replies both come back as
    /// a valid, degraded [`Extraction`].
    pub async fn extract(&self, document_text: &str) -> Extraction {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(build_extraction_prompt(document_text))],
            temperature: Some(self.temperature),
        };

        match self.gateway.complete(&request).await {
            Ok(raw) => interpret_response(&raw, document_text),
            Err(error) => {
                warn!(%error, "structured extraction call failed");
                Extraction {
                    summary: Summary {
                        overall: format!("AI analysis unavailable: {error}"),
                        ..Summary::default()
                    },
                    tests: Vec::new(),
                    outcome: ExtractionOutcome::GatewayFailed(error.to_string()),
                    completeness: CompletenessReport::default(),
                }
            }
        }
    }
}

pub fn build_extraction_prompt(document_text: &str) -> String {
    let checklist = REQUIRED_TESTS
        .iter()
        .enumerate()
        .map(|(index, test)| format!("{}. {}", index + 1, test.label))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a medical lab report analysis AI.

From this lab report text, extract a JSON object with this exact structure:

{{
  "summary": "Short overall overview in 2-3 sentences",
  "key_findings": ["finding 1", "finding 2"],
  "recommendations": ["recommendation 1", "recommendation 2"],
  "severity": "low" | "medium" | "high",
  "tests": [
    {{
      "name": "Test name",
      "value": "numeric or text value",
      "unit": "unit string",
      "normalRange": "e.g. 4.0 - 11.0",
      "status": "low" | "normal" | "high",
      "interpretation": "1-2 sentence explanation for this test"
    }}
  ]
}}

You MUST include each of these tests in "tests" whenever it appears in the report:
{checklist}

Also include any other significant tests found in the report.

Rules:
- Return ONLY valid JSON.
- No backticks, no Markdown, no text before or after the JSON.
- Write numeric values without thousands separators (e.g. "7900", not "7,900").

Lab Report Text:
"""{document_text}""""#
    )
}

pub fn interpret_response(raw: &str, source_text: &str) -> Extraction {
    let parsed = parse_llm_response(raw);
    let outcome = match &parsed {
        Ok(_) => ExtractionOutcome::Parsed,
        Err(_) => {
            warn!(
                reply_chars = raw.chars().count(),
                "llm reply was not json, keeping raw text as summary"
            );
            ExtractionOutcome::Degraded
        }
    };

    let (summary, tests) = into_summary_and_tests(parsed);
    let completeness = if outcome == ExtractionOutcome::Parsed {
        check_required_tests(&tests, source_text)
    } else {
        CompletenessReport::default()
    };

    info!(
        tests = tests.len(),
        severity = ?summary.severity,
        outcome = ?outcome,
        "structured extraction finished"
    );

    Extraction {
        summary,
        tests,
        outcome,
        completeness,
    }
}

/// Removes a leading ```` ``` ```` fence (with optional language tag) and a
/// trailing one.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let without_opening = match opening_fence() {
        Some(pattern) => pattern.replace(trimmed, "").into_owned(),
        None => trimmed.trim_start_matches('`').to_string(),
    };

    let without_closing = without_opening.trim_end();
    without_closing
        .strip_suffix("```")
        .unwrap_or(without_closing)
        .trim()
        .to_string()
}

pub fn parse_llm_response(raw: &str) -> Result<ParsedObject, RawText> {
    let cleaned = strip_code_fences(raw);

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(object);
    }

    // Models sometimes wrap the object in prose; try the outermost braces.
    if let (Some(open), Some(close)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if open < close {
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&cleaned[open..=close])
            {
                debug!("recovered json object embedded in llm reply");
                return Ok(object);
            }
        }
    }

    Err(RawText(cleaned))
}

pub fn into_summary_and_tests(parsed: Result<ParsedObject, RawText>) -> (Summary, Vec<TestResult>) {
    let object = match parsed {
        Ok(object) => object,
        Err(RawText(text)) => {
            return (
                Summary {
                    overall: text,
                    key_findings: Vec::new(),
                    recommendations: Vec::new(),
                    severity: Severity::Low,
                },
                Vec::new(),
            );
        }
    };

    let summary = Summary {
        overall: text_field(&object, &["summary", "overall"]),
        key_findings: string_list(&object, &["key_findings", "keyFindings"]),
        recommendations: string_list(&object, &["recommendations"]),
        severity: Severity::parse_lenient(&text_field(&object, &["severity"])).unwrap_or_default(),
    };

    let tests = first_present(&object, &["tests", "testResults", "test_results"])
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_object)
                .filter_map(test_result_from)
                .collect()
        })
        .unwrap_or_default();

    (summary, tests)
}

/// Advisory only: logs which required tests the extraction left out.
pub fn check_required_tests(tests: &[TestResult], source_text: &str) -> CompletenessReport {
    let extracted: Vec<String> = tests.iter().map(|test| test.name.to_lowercase()).collect();
    let source = source_text.to_lowercase();

    let mut report = CompletenessReport::default();
    for required in REQUIRED_TESTS.iter() {
        if extracted.iter().any(|name| required.matches(name)) {
            continue;
        }
        report.missing.push(required.label.to_string());
        if required.matches(&source) {
            report.missing_but_mentioned.push(required.label.to_string());
        }
    }

    if !report.missing_but_mentioned.is_empty() {
        warn!(
            missing = ?report.missing_but_mentioned,
            extracted = ?tests.iter().map(|test| test.name.as_str()).collect::<Vec<_>>(),
            "required tests mentioned in the report were not extracted"
        );
    } else if !report.missing.is_empty() {
        debug!(missing = ?report.missing, "required tests not present in report");
    }

    report
}

fn test_result_from(entry: &ParsedObject) -> Option<TestResult> {
    let name = text_field(entry, &["name", "test", "test_name"]);
    let value = strip_thousands_separators(&text_field(entry, &["value", "result"]));
    if name.is_empty() && value.is_empty() {
        return None;
    }

    let normal_range = text_field(
        entry,
        &["normalRange", "normal_range", "reference_range", "range"],
    );
    let status = TestStatus::parse_lenient(&text_field(entry, &["status", "flag"]))
        .or_else(|| infer_status(&value, &normal_range))
        .unwrap_or_default();

    Some(TestResult {
        name,
        value,
        unit: text_field(entry, &["unit", "units"]),
        normal_range,
        status,
        interpretation: text_field(entry, &["interpretation", "explanation"]),
    })
}

/// Derives low/normal/high from a value and a reference range such as
/// `4.0 - 11.0`, `12.0–15.5`, `< 200` or `> 30`.
pub fn infer_status(value: &str, normal_range: &str) -> Option<TestStatus> {
    let measured = *numbers_in(value).first()?;
    let bounds = numbers_in(normal_range);
    let range = normal_range.trim().to_lowercase();

    let upper_only = range.starts_with('<')
        || range.starts_with('≤')
        || range.starts_with("less than")
        || range.starts_with("up to")
        || range.starts_with("below");
    let lower_only = range.starts_with('>')
        || range.starts_with('≥')
        || range.starts_with("greater than")
        || range.starts_with("more than")
        || range.starts_with("above");

    let status = if upper_only {
        let upper = *bounds.first()?;
        if measured > upper {
            TestStatus::High
        } else {
            TestStatus::Normal
        }
    } else if lower_only {
        let lower = *bounds.first()?;
        if measured < lower {
            TestStatus::Low
        } else {
            TestStatus::Normal
        }
    } else {
        let (lower, upper) = match bounds.as_slice() {
            [lower, upper, ..] => (*lower, *upper),
            _ => return None,
        };
        if measured < lower {
            TestStatus::Low
        } else if measured > upper {
            TestStatus::High
        } else {
            TestStatus::Normal
        }
    };

    Some(status)
}

pub fn strip_thousands_separators(value: &str) -> String {
    match grouped_number() {
        Some(pattern) if pattern.is_match(value) => value.replace(',', ""),
        _ => value.to_string(),
    }
}

fn numbers_in(text: &str) -> Vec<f64> {
    match number_pattern() {
        Some(pattern) => pattern
            .find_iter(text)
            .filter_map(|found| found.as_str().replace(',', "").parse::<f64>().ok())
            .collect(),
        None => Vec::new(),
    }
}

fn first_present<'a>(object: &'a ParsedObject, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| object.get(*key).filter(|value| !value.is_null()))
}

fn text_field(object: &ParsedObject, keys: &[&str]) -> String {
    first_present(object, keys)
        .map(value_to_text)
        .unwrap_or_default()
}

fn string_list(object: &ParsedObject, keys: &[&str]) -> Vec<String> {
    match first_present(object, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .map(value_to_text)
            .filter(|item| !item.is_empty())
            .collect(),
        Some(Value::String(item)) if !item.trim().is_empty() => vec![item.trim().to_string()],
        _ => Vec::new(),
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn opening_fence() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*\r?\n?").ok())
        .as_ref()
}

fn grouped_number() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*[<>]?\s*-?\d{1,3}(,\d{3})+(\.\d+)?\s*$").ok())
        .as_ref()
}

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?").ok())
        .as_ref()
}
