//! triage.rule: keyword rule that proposes a label or comment.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::triage_rules;

/// The remote mutation a suggestion asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Label,
    Comment,
}

impl SuggestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionKind::Label => "label",
            SuggestionKind::Comment => "comment",
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported suggestion type: {0:?}")]
pub struct UnsupportedSuggestion(pub String);

impl FromStr for SuggestionKind {
    type Err = UnsupportedSuggestion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "label" => Ok(SuggestionKind::Label),
            "comment" => Ok(SuggestionKind::Comment),
            _ => Err(UnsupportedSuggestion(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = triage_rules)]
pub struct Rule {
    pub id: i64,
    /// Empty matches every evaluated event type.
    pub event_type: String,
    pub keyword: String,
    pub suggestion_type: String,
    pub suggestion_value: String,
    pub reason: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    pub fn kind(&self) -> Result<SuggestionKind, UnsupportedSuggestion> {
        self.suggestion_type.parse()
    }
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = triage_rules)]
pub struct NewRule {
    pub event_type: String,
    pub keyword: String,
    pub suggestion_type: String,
    pub suggestion_value: String,
    pub reason: String,
    pub is_active: bool,
}
