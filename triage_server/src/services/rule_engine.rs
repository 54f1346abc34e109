//! Keyword rule evaluation.
//!
//! `evaluate` is pure: the same event type, payload and rule set always give
//! the same suggestions in the same order.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::payload::WebhookPayload;
use crate::models::rule::{Rule, SuggestionKind};

/// One proposed remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub value: String,
    pub reason: String,
    /// The keyword that triggered this suggestion, as written in the rule.
    pub matched: String,
}

struct BuiltinRule {
    keyword: &'static str,
    kind: SuggestionKind,
    value: &'static str,
    reason: &'static str,
}

/// Used when no active rule applies to the event type.
const BUILTIN_RULES: &[BuiltinRule] = &[
    BuiltinRule {
        keyword: "duplicate",
        kind: SuggestionKind::Label,
        value: "duplicate",
        reason: "Mentions a duplicate",
    },
    BuiltinRule {
        keyword: "duplicate",
        kind: SuggestionKind::Comment,
        value: "This looks like a duplicate. Please link the original issue so it can be closed.",
        reason: "Mentions a duplicate",
    },
    BuiltinRule {
        keyword: "urgent",
        kind: SuggestionKind::Label,
        value: "priority-high",
        reason: "Marked as urgent",
    },
    BuiltinRule {
        keyword: "urgent",
        kind: SuggestionKind::Comment,
        value: "Flagged as urgent. A maintainer will take a look shortly.",
        reason: "Marked as urgent",
    },
    BuiltinRule {
        keyword: "help wanted",
        kind: SuggestionKind::Label,
        value: "help wanted",
        reason: "Asks for help",
    },
    BuiltinRule {
        keyword: "help wanted",
        kind: SuggestionKind::Comment,
        value: "Thanks! This has been marked as open for contributions.",
        reason: "Asks for help",
    },
];

/// Event types the engine looks at. Everything else yields no suggestions.
pub fn is_evaluated(event_type: &str) -> bool {
    matches!(event_type, "issues" | "pull_request")
}

struct Candidate<'a> {
    keyword: &'a str,
    kind: SuggestionKind,
    value: &'a str,
    reason: &'a str,
}

fn applicable<'a>(event_type: &str, rules: &'a [Rule]) -> Vec<Candidate<'a>> {
    rules
        .iter()
        .filter(|r| r.is_active && (r.event_type.is_empty() || r.event_type == event_type))
        .filter_map(|r| match r.kind() {
            Ok(kind) => Some(Candidate {
                keyword: &r.keyword,
                kind,
                value: &r.suggestion_value,
                reason: &r.reason,
            }),
            Err(e) => {
                tracing::warn!(rule_id = r.id, "Skipping rule: {e}");
                None
            }
        })
        .collect()
}

fn builtins() -> Vec<Candidate<'static>> {
    BUILTIN_RULES
        .iter()
        .map(|b| Candidate {
            keyword: b.keyword,
            kind: b.kind,
            value: b.value,
            reason: b.reason,
        })
        .collect()
}

/// Match `rules` against the issue or pull request in `payload`.
pub fn evaluate(event_type: &str, payload: &WebhookPayload, rules: &[Rule]) -> Vec<Suggestion> {
    if !is_evaluated(event_type) {
        return Vec::new();
    }
    let Some(subject) = payload.subject(event_type) else {
        return Vec::new();
    };
    let corpus = subject.corpus();

    let mut candidates = applicable(event_type, rules);
    if candidates.is_empty() {
        candidates = builtins();
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for c in candidates {
        let needle = c.keyword.trim().to_lowercase();
        if needle.is_empty() || !corpus.contains(&needle) {
            continue;
        }
        if !seen.insert((c.kind, c.value, c.keyword)) {
            continue;
        }
        out.push(Suggestion {
            kind: c.kind,
            value: c.value.to_string(),
            reason: c.reason.to_string(),
            matched: c.keyword.to_string(),
        });
    }
    out
}
