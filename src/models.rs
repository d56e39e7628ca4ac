use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::intent::IntentKind;

/// Keys tried, in order, when a record needs a human-facing title.
const TITLE_KEYS: &[&str] = &["title", "name", "text", "companyName"];

/// Keys tried, in order, when sorting records newest first.
const DATE_KEYS: &[&str] = &["updatedAt", "createdAt", "date"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    #[serde(alias = "message")]
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    ActionMatched,
    DomainResultFormatted,
    DomainResultEmptyButHasItems,
    UnknownFaq,
    UnknownHelp,
    UnknownGeneric,
    DomainNoResult,
    FinalFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub response_text: String,
    pub intent_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    pub resolution: Resolution,
    pub trace_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSummary {
    pub menu_id: String,
    pub label: String,
    pub intent: IntentKind,
    pub collection: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
}

/// A document fetched from the store. `data` is the stored JSON object as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub data: Map<String, Value>,
}

impl CandidateRecord {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn section(&self, key: &str) -> Option<&Value> {
        self.data
            .get("sections")
            .and_then(Value::as_object)
            .and_then(|sections| sections.get(key))
            .filter(|value| !value.is_null())
    }

    /// Returns the key the title came from alongside the title itself.
    pub fn display_title(&self) -> Option<(&'static str, &str)> {
        TITLE_KEYS.iter().find_map(|key| {
            self.data
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .map(|title| (*key, title))
        })
    }

    pub fn sort_date(&self) -> &str {
        DATE_KEYS
            .iter()
            .find_map(|key| self.data.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
    }

    pub fn search_blob(&self) -> String {
        let body = serde_json::to_string(&self.data).unwrap_or_default();
        format!("{} {}", self.id, body).to_lowercase()
    }
}
