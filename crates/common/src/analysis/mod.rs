//! AI analysis and routing suggestions
//!
//! `AnalysisProvider` sends a bounded excerpt to the configured LLM and
//! parses a structured reply. It never fails: provider errors are logged
//! and replaced with deterministic fallbacks marked `degraded`.

mod confidence;
mod llm;
mod prompts;

pub use confidence::normalize_confidence;
pub use llm::{create_llm_client, DisabledLlm, LlmClient, MockLlm, OpenAiChatClient};

use crate::config::AnalysisConfig;
use crate::db::models::{Category, Urgency};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{instrument, warn};

/// Characters of source text kept in a fallback summary
const FALLBACK_SUMMARY_CHARS: usize = 500;

pub const MANUAL_REVIEW_NOTICE: &str = "Automated analysis unavailable; manual review required";

#[derive(Debug, Clone, Error)]
pub enum AnalysisProviderError {
    #[error("analysis provider is not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("provider quota exhausted")]
    QuotaExceeded,

    #[error("provider returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("provider returned an empty reply")]
    EmptyResponse,

    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// What the model is told about the document
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub title: String,
    pub category: Category,
    /// Active department names offered to the routing prompt
    pub candidate_departments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub priority: Urgency,
    pub deadlines: Vec<String>,
    pub action_items: Vec<String>,
    /// True when this is a fallback object
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSuggestion {
    pub primary_department: String,
    pub reasoning: String,
    /// 0-100
    pub confidence: u8,
    pub degraded: bool,
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default, alias = "keyPoints")]
    key_points: Vec<Value>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    deadlines: Vec<Value>,
    #[serde(default, alias = "actionItems")]
    action_items: Vec<Value>,
}

#[derive(Deserialize)]
struct RawRouting {
    #[serde(default, alias = "primaryDepartment", alias = "department")]
    primary_department: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Value,
}

pub struct AnalysisProvider {
    llm: Arc<dyn LlmClient>,
    default_department: String,
    analysis_excerpt_chars: usize,
    routing_excerpt_chars: usize,
}

impl AnalysisProvider {
    pub fn new(llm: Arc<dyn LlmClient>, config: &AnalysisConfig) -> Self {
        Self {
            llm,
            default_department: config.default_department.clone(),
            analysis_excerpt_chars: config.analysis_excerpt_chars,
            routing_excerpt_chars: config.routing_excerpt_chars,
        }
    }

    pub fn default_department(&self) -> &str {
        &self.default_department
    }

    /// Summarize a document. Always returns a well-formed result.
    #[instrument(skip(self, text, context), fields(title = %context.title, model = self.llm.model_name()))]
    pub async fn analyze(&self, text: &str, context: &DocumentContext) -> AnalysisResult {
        match self.try_analyze(text, context).await {
            Ok(result) => {
                crate::metrics::record_analysis("analyze", false);
                result
            }
            Err(e) => {
                warn!(error = %e, "Document analysis failed, using fallback");
                crate::metrics::record_analysis("analyze", true);
                self.fallback_analysis(text)
            }
        }
    }

    /// Suggest a department. Always returns a well-formed result.
    #[instrument(skip(self, text, context), fields(title = %context.title, model = self.llm.model_name()))]
    pub async fn suggest_routing(&self, text: &str, context: &DocumentContext) -> RoutingSuggestion {
        match self.try_suggest_routing(text, context).await {
            Ok(result) => {
                crate::metrics::record_analysis("suggest_routing", false);
                result
            }
            Err(e) => {
                warn!(error = %e, "Routing suggestion failed, using fallback");
                crate::metrics::record_analysis("suggest_routing", true);
                self.fallback_routing()
            }
        }
    }

    async fn try_analyze(
        &self,
        text: &str,
        context: &DocumentContext,
    ) -> Result<AnalysisResult, AnalysisProviderError> {
        let excerpt = excerpt(text, self.analysis_excerpt_chars);
        let reply = self
            .llm
            .complete(prompts::ANALYSIS_SYSTEM, &prompts::analysis_prompt(&excerpt, context))
            .await?;

        let raw: RawAnalysis = parse_json_reply(&reply)?;
        let summary = raw
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AnalysisProviderError::Malformed("missing summary".into()))?;

        let priority = raw
            .priority
            .and_then(|p| p.parse::<Urgency>().ok())
            .unwrap_or(Urgency::Medium);

        Ok(AnalysisResult {
            summary,
            key_points: flatten_items(raw.key_points),
            priority,
            deadlines: flatten_items(raw.deadlines),
            action_items: flatten_items(raw.action_items),
            degraded: false,
        })
    }

    async fn try_suggest_routing(
        &self,
        text: &str,
        context: &DocumentContext,
    ) -> Result<RoutingSuggestion, AnalysisProviderError> {
        let excerpt = excerpt(text, self.routing_excerpt_chars);
        let reply = self
            .llm
            .complete(prompts::ROUTING_SYSTEM, &prompts::routing_prompt(&excerpt, context))
            .await?;

        let raw: RawRouting = parse_json_reply(&reply)?;
        let primary_department = raw
            .primary_department
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| AnalysisProviderError::Malformed("missing primary_department".into()))?;

        Ok(RoutingSuggestion {
            primary_department,
            reasoning: raw.reasoning.unwrap_or_default().trim().to_string(),
            confidence: normalize_confidence(&raw.confidence),
            degraded: false,
        })
    }

    pub fn fallback_analysis(&self, text: &str) -> AnalysisResult {
        let summary = excerpt(text.trim(), FALLBACK_SUMMARY_CHARS);
        AnalysisResult {
            summary: if summary.is_empty() {
                MANUAL_REVIEW_NOTICE.to_string()
            } else {
                summary
            },
            key_points: vec![MANUAL_REVIEW_NOTICE.to_string()],
            priority: Urgency::Medium,
            deadlines: Vec::new(),
            action_items: Vec::new(),
            degraded: true,
        }
    }

    pub fn fallback_routing(&self) -> RoutingSuggestion {
        RoutingSuggestion {
            primary_department: self.default_department.clone(),
            reasoning: "Automated routing unavailable; defaulted for manual review".to_string(),
            confidence: 0,
            degraded: true,
        }
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").expect("fence pattern is valid")
    })
}

/// Pull the JSON object out of a reply that may be fenced or wrapped in prose
pub fn extract_json(reply: &str) -> Option<&str> {
    let body = fence_regex()
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
        .trim();

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

fn parse_json_reply<T: for<'de> Deserialize<'de>>(reply: &str) -> Result<T, AnalysisProviderError> {
    let json = extract_json(reply)
        .ok_or_else(|| AnalysisProviderError::Malformed("no JSON object in reply".into()))?;
    serde_json::from_str(json).map_err(|e| AnalysisProviderError::Malformed(e.to_string()))
}

/// Models return list items as strings or small objects
fn flatten_items(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => {
                let parts: Vec<String> = map
                    .values()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .filter(|s| !s.is_empty())
                    .collect();
                Some(parts.join(" - "))
            }
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> DocumentContext {
        DocumentContext {
            title: "Budget circular".into(),
            category: Category::Financial,
            candidate_departments: vec!["Finance".into()],
        }
    }

    fn provider(llm: MockLlm) -> AnalysisProvider {
        AnalysisProvider::new(Arc::new(llm), &AnalysisConfig::default())
    }

    #[test]
    fn test_extract_json_strips_fences_and_prose() {
        let fenced = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(extract_json(fenced), Some("{\"a\": 1}"));

        let prose = "Sure! {\"a\": {\"b\": 2}} hope this helps";
        assert_eq!(extract_json(prose), Some("{\"a\": {\"b\": 2}}"));

        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_excerpt_is_char_safe() {
        assert_eq!(excerpt("héllo wörld", 5), "héllo…");
        assert_eq!(excerpt("short", 10), "short");
    }

    #[tokio::test]
    async fn test_analyze_parses_fenced_reply() {
        let reply = "```json\n{\"summary\": \"Allocates funds.\", \"keyPoints\": [\"Q3 budget\"], \
                     \"priority\": \"HIGH\", \"deadlines\": [{\"date\": \"2026-11-01\", \"item\": \"submit\"}], \
                     \"action_items\": [\"Approve\"]}\n```";
        let result = provider(MockLlm::always(reply)).analyze("text", &context()).await;

        assert!(!result.degraded);
        assert_eq!(result.summary, "Allocates funds.");
        assert_eq!(result.key_points, vec!["Q3 budget"]);
        assert_eq!(result.priority, Urgency::High);
        assert_eq!(result.deadlines.len(), 1);
        assert!(result.deadlines[0].contains("2026-11-01"));
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_error() {
        let text = "A".repeat(2000);
        let result = provider(MockLlm::failing(AnalysisProviderError::QuotaExceeded))
            .analyze(&text, &context())
            .await;

        assert!(result.degraded);
        assert_eq!(result.priority, Urgency::Medium);
        assert_eq!(result.key_points, vec![MANUAL_REVIEW_NOTICE]);
        assert!(result.summary.chars().count() <= FALLBACK_SUMMARY_CHARS + 1);
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_malformed_reply() {
        let result = provider(MockLlm::always("I cannot help with that"))
            .analyze("some text", &context())
            .await;
        assert!(result.degraded);
        assert_eq!(result.summary, "some text");
    }

    #[tokio::test]
    async fn test_suggest_routing_normalizes_confidence() {
        let reply = r#"{"primary_department": "Finance", "reasoning": "Budget matter", "confidence": 0.92}"#;
        let result = provider(MockLlm::always(reply)).suggest_routing("text", &context()).await;

        assert_eq!(result.primary_department, "Finance");
        assert_eq!(result.confidence, 92);
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn test_suggest_routing_fallback_uses_configured_default() {
        let config = AnalysisConfig {
            default_department: "Registry Office".into(),
            ..AnalysisConfig::default()
        };
        let provider = AnalysisProvider::new(
            Arc::new(MockLlm::failing(AnalysisProviderError::NotConfigured)),
            &config,
        );

        let result = provider.suggest_routing("text", &context()).await;
        assert_eq!(result.primary_department, "Registry Office");
        assert_eq!(result.confidence, 0);
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn test_routing_excerpt_is_bounded() {
        let llm = Arc::new(MockLlm::always(r#"{"primary_department": "Finance", "confidence": 80}"#));
        let config = AnalysisConfig {
            routing_excerpt_chars: 50,
            ..AnalysisConfig::default()
        };
        let provider = AnalysisProvider::new(llm.clone(), &config);

        provider.suggest_routing(&"x".repeat(10_000), &context()).await;
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains(&format!("{}…", "x".repeat(50))));
        assert!(!prompt.contains(&"x".repeat(51)));
    }
}
