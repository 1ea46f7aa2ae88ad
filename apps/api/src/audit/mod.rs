//! Quality Auditor: turns resume text into a fixed-shape audit record.
//!
//! The reasoning service is optional. Whatever it returns (or fails to
//! return) passes through `normalize`, so callers always get exactly
//! `BULLET_COUNT` recommendations, `GAP_COUNT` gap findings, a score in
//! `0..=100` and a tier from the closed set.

pub mod auditor;
pub mod fallback;
pub mod prompts;
pub mod tier;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::orders::models::Tier;

pub use auditor::QualityAuditor;
pub use fallback::fallback_audit;
pub use tier::guess_tier;

pub const BULLET_COUNT: usize = 4;
pub const GAP_COUNT: usize = 3;
/// Only this many characters of resume text are sent upstream.
pub const MAX_AUDIT_CHARS: usize = 12_000;
/// Used when the upstream score is missing or not a number.
const DEFAULT_SCORE: u8 = 60;
const DEFAULT_SUMMARY: &str = "Analysis incomplete.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapFinding {
    pub category: String,
    pub finding: String,
}

impl GapFinding {
    pub fn new(category: &str, finding: &str) -> Self {
        Self {
            category: category.to_string(),
            finding: finding.to_string(),
        }
    }
}

/// The normalized audit record returned to customers and stored on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub score: u8,
    pub summary: String,
    pub suggested_tier: Tier,
    pub bullet_recommendations: Vec<String>,
    pub gap_analysis: Vec<GapFinding>,
}

/// Why an audit came from the fallback path instead of the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    NotConfigured,
    Upstream(String),
    Malformed(String),
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradeReason::NotConfigured => f.write_str("reasoning service not configured"),
            DegradeReason::Upstream(msg) => write!(f, "reasoning service failed: {msg}"),
            DegradeReason::Malformed(msg) => write!(f, "reasoning service output malformed: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditOutcome {
    Complete(Audit),
    Degraded { audit: Audit, reason: DegradeReason },
}

impl AuditOutcome {
    pub fn audit(&self) -> &Audit {
        match self {
            AuditOutcome::Complete(audit) => audit,
            AuditOutcome::Degraded { audit, .. } => audit,
        }
    }

    pub fn into_audit(self) -> Audit {
        match self {
            AuditOutcome::Complete(audit) => audit,
            AuditOutcome::Degraded { audit, .. } => audit,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AuditOutcome::Degraded { .. })
    }
}

/// Raw upstream shape. Every field defaults to `Null` and is coerced by
/// `normalize`; only a non-object payload fails to decode.
#[derive(Debug, Default, Deserialize)]
pub struct RawAudit {
    #[serde(default)]
    pub score: Value,
    #[serde(default)]
    pub summary: Value,
    #[serde(default)]
    pub suggested_tier: Value,
    #[serde(default)]
    pub bullet_recommendations: Value,
    #[serde(default)]
    pub gap_analysis: Value,
}

/// Coerces a raw upstream audit into the fixed schema.
///
/// - score: numbers and numeric strings are rounded and clamped to `0..=100`
/// - tier: lenient match against the closed set, else `hint`
/// - bullets: non-empty strings, truncated to 4, backfilled from the fallback
/// - gaps: objects with non-empty `category` and `finding`, truncated to 3,
///   backfilled with fallback gaps whose category is not already present
pub fn normalize(raw: RawAudit, hint: Tier) -> Audit {
    let fallback = fallback_audit(hint);

    let score = coerce_score(&raw.score).unwrap_or(DEFAULT_SCORE);

    let summary = raw
        .summary
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SUMMARY)
        .to_string();

    let suggested_tier = raw
        .suggested_tier
        .as_str()
        .and_then(Tier::parse_lenient)
        .unwrap_or(hint);

    let mut bullets: Vec<String> = raw
        .bullet_recommendations
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .take(BULLET_COUNT)
                .collect()
        })
        .unwrap_or_default();
    for candidate in fallback.bullet_recommendations {
        if bullets.len() >= BULLET_COUNT {
            break;
        }
        if !bullets.contains(&candidate) {
            bullets.push(candidate);
        }
    }

    let mut gaps: Vec<GapFinding> = raw
        .gap_analysis
        .as_array()
        .map(|arr| arr.iter().filter_map(coerce_gap).take(GAP_COUNT).collect())
        .unwrap_or_default();
    for candidate in fallback.gap_analysis {
        if gaps.len() >= GAP_COUNT {
            break;
        }
        if !gaps
            .iter()
            .any(|g| g.category.eq_ignore_ascii_case(&candidate.category))
        {
            gaps.push(candidate);
        }
    }

    Audit {
        score,
        summary,
        suggested_tier,
        bullet_recommendations: bullets,
        gap_analysis: gaps,
    }
}

fn coerce_score(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(0.0, 100.0) as u8)
}

fn coerce_gap(value: &Value) -> Option<GapFinding> {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    Some(GapFinding {
        category: field("category")?,
        finding: field("finding")?,
    })
}

/// Truncates on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
