use std::time::Duration;

use tracing::{info, warn};

use crate::audit::prompts::{AUDIT_PROMPT_TEMPLATE, AUDIT_SYSTEM};
use crate::audit::{
    fallback_audit, guess_tier, normalize, truncate_chars, AuditOutcome, DegradeReason, RawAudit,
    MAX_AUDIT_CHARS,
};
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{LlmClient, LlmError};

/// Attempts per audit when the service answers with unusable output.
const MAX_AUDIT_ATTEMPTS: u32 = 3;
const AUDIT_BACKOFF: Duration = Duration::from_millis(500);

/// Produces an audit for every input. Never returns an error: without a
/// configured reasoning service, or when it keeps failing, the outcome is
/// `Degraded` with the deterministic fallback.
#[derive(Clone)]
pub struct QualityAuditor {
    llm: Option<LlmClient>,
    max_attempts: u32,
    backoff: Duration,
}

impl QualityAuditor {
    pub fn new(llm: Option<LlmClient>) -> Self {
        Self {
            llm,
            max_attempts: MAX_AUDIT_ATTEMPTS,
            backoff: AUDIT_BACKOFF,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn audit(&self, text: &str) -> AuditOutcome {
        let hint = guess_tier(text);

        let Some(llm) = &self.llm else {
            return AuditOutcome::Degraded {
                audit: fallback_audit(hint),
                reason: DegradeReason::NotConfigured,
            };
        };

        let prompt = AUDIT_PROMPT_TEMPLATE
            .replace("{tier_hint}", hint.as_str())
            .replace("{resume_text}", truncate_chars(text, MAX_AUDIT_CHARS));
        let system = format!("{AUDIT_SYSTEM}\n\n{JSON_ONLY_SYSTEM}");

        let mut attempt = 0;
        let reason = loop {
            attempt += 1;
            match llm.call_json::<RawAudit>(&prompt, &system).await {
                Ok(raw) => {
                    let audit = normalize(raw, hint);
                    info!(
                        "Audit complete: score={} tier={} (hint {})",
                        audit.score, audit.suggested_tier, hint
                    );
                    return AuditOutcome::Complete(audit);
                }
                Err(e) if e.is_malformed_output() => {
                    if attempt >= self.max_attempts {
                        break DegradeReason::Malformed(e.to_string());
                    }
                    let delay = self.backoff * attempt;
                    warn!(
                        "Audit attempt {attempt} returned unusable output ({e}), retrying after {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break upstream_reason(e),
            }
        };

        warn!("Audit degraded to fallback: {reason}");
        AuditOutcome::Degraded {
            audit: fallback_audit(hint),
            reason,
        }
    }
}

fn upstream_reason(e: LlmError) -> DegradeReason {
    DegradeReason::Upstream(e.to_string())
}
