//! Typed request payloads for TeamUp events.
//!
//! # Design
//! Responses are returned as `serde_json::Value` so the upstream schema passes
//! through untouched. Request bodies accept any `Serialize` value; `EventDraft`
//! is a convenience for the common fields. Unset fields are skipped, so an
//! empty draft encodes as `{}` and is sent without a body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields of a TeamUp event accepted by create and update calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcalendar_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_dt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_dt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub who: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
    /// Any further fields, passed through as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventDraft {
    pub fn new(title: impl Into<String>, start_dt: impl Into<String>, end_dt: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            start_dt: Some(start_dt.into()),
            end_dt: Some(end_dt.into()),
            ..Self::default()
        }
    }

    pub fn subcalendar(mut self, id: u64) -> Self {
        self.subcalendar_ids.push(id);
        self
    }
}
