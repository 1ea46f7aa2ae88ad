use crate::audit::{Audit, GapFinding};
use crate::orders::models::Tier;

const FALLBACK_SCORE: u8 = 65;

/// Deterministic audit used when the reasoning service is absent or unusable,
/// and as the backfill source for `normalize`.
///
/// Always carries exactly four recommendations and three gaps with the
/// categories `Impact`, `ATS Compliance`, `Targeting`.
pub fn fallback_audit(tier: Tier) -> Audit {
    let (summary, lead_bullet) = match tier {
        Tier::Entry => (
            "Good foundation, but coursework and internships read as duties rather than results.",
            "Lead with projects and internships, each with one measurable outcome.",
        ),
        Tier::Mid => (
            "Good content but missing strategic KPIs and clear impact signals.",
            "Quantify achievements with metrics ($, %, volume, team size).",
        ),
        Tier::Senior => (
            "Strong experience, but ownership and scope are understated for a senior search.",
            "Show scope for each role: team size, budget, systems or revenue owned.",
        ),
        Tier::Exec => (
            "Leadership history is present, but business outcomes are buried under responsibilities.",
            "Open each role with the business result you were accountable for (P&L, growth, cost).",
        ),
        Tier::Csuite => (
            "Executive profile lacks a board-level narrative tying strategy to enterprise value.",
            "Frame each role around enterprise outcomes: valuation, transformation, market position.",
        ),
    };

    Audit {
        score: FALLBACK_SCORE,
        summary: summary.to_string(),
        suggested_tier: tier,
        bullet_recommendations: vec![
            lead_bullet.to_string(),
            "Replace passive phrasing with leadership verbs (Led, Owned, Delivered).".to_string(),
            "Tighten the top third with a targeted headline and role-relevant keywords.".to_string(),
            "Remove generic objectives; add a focused positioning statement.".to_string(),
        ],
        gap_analysis: vec![
            GapFinding::new(
                "Impact",
                "Missing quantifiable metrics tied to outcomes (revenue, savings, growth).",
            ),
            GapFinding::new(
                "ATS Compliance",
                "Formatting and section structure may reduce parsing accuracy in ATS.",
            ),
            GapFinding::new(
                "Targeting",
                "Keywords and role signal are not specific enough for shortlist ranking.",
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{BULLET_COUNT, GAP_COUNT};

    #[test]
    fn test_fallback_shape_for_every_tier() {
        for tier in Tier::ALL {
            let audit = fallback_audit(tier);
            assert_eq!(audit.suggested_tier, tier);
            assert_eq!(audit.bullet_recommendations.len(), BULLET_COUNT);
            assert_eq!(audit.gap_analysis.len(), GAP_COUNT);
            assert!(audit.score <= 100);
            assert!(!audit.summary.is_empty());
        }
    }

    #[test]
    fn test_fallback_bullets_are_distinct() {
        for tier in Tier::ALL {
            let audit = fallback_audit(tier);
            let mut bullets = audit.bullet_recommendations.clone();
            bullets.sort();
            bullets.dedup();
            assert_eq!(bullets.len(), BULLET_COUNT);
        }
    }

    #[test]
    fn test_fallback_is_deterministic() {
        assert_eq!(fallback_audit(Tier::Senior), fallback_audit(Tier::Senior));
        assert_ne!(fallback_audit(Tier::Entry).summary, fallback_audit(Tier::Csuite).summary);
    }
}
