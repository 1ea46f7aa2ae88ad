//! Cheap seniority guess from raw resume text. Only a hint: the reasoning
//! service's tier wins whenever it returns a valid one.

use std::sync::OnceLock;

use regex::Regex;

use crate::orders::models::Tier;

const CSUITE_TITLES: &[&str] = &[
    "chief executive",
    "chief operating",
    "chief financial",
    "chief technology",
    "chief marketing",
    "chief product",
    "chief revenue",
    "chief information",
    "ceo",
    "coo",
    "cfo",
    "cto",
    "cmo",
    "cio",
    "co-founder",
    "founder",
    "svp",
    "senior vice president",
    "executive vice president",
];

const EXEC_TITLES: &[&str] = &[
    "vice president",
    "vp",
    "director",
    "head of",
    "general manager",
];

const SENIOR_TITLES: &[&str] = &[
    "senior",
    "sr.",
    "lead",
    "principal",
    "staff",
    "manager",
    "architect",
];

const ENTRY_TITLES: &[&str] = &[
    "intern",
    "internship",
    "graduate",
    "junior",
    "jr.",
    "entry level",
    "entry-level",
    "student",
    "trainee",
    "apprentice",
];

fn years_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})\+?\s*(?:years|yrs)\b").expect("static regex is valid")
    })
}

/// Returns the highest tier whose title keywords appear as whole words, then
/// lets an explicit "N years" claim move an otherwise-unmatched resume.
/// Defaults to `Mid`.
pub fn guess_tier(text: &str) -> Tier {
    let lower = text.to_lowercase();
    let words = tokenize(&lower);

    let has_any = |keywords: &[&str]| keywords.iter().any(|k| contains_phrase(&words, k));

    if has_any(CSUITE_TITLES) {
        return Tier::Csuite;
    }
    if has_any(EXEC_TITLES) {
        return Tier::Exec;
    }
    if has_any(SENIOR_TITLES) {
        return Tier::Senior;
    }

    if let Some(years) = max_years_claimed(&lower) {
        return match years {
            0..=1 => Tier::Entry,
            2..=6 => Tier::Mid,
            7..=11 => Tier::Senior,
            _ => Tier::Exec,
        };
    }

    if has_any(ENTRY_TITLES) {
        return Tier::Entry;
    }
    Tier::Mid
}

fn max_years_claimed(lower: &str) -> Option<u32> {
    years_regex()
        .captures_iter(lower)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .max()
}

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '-'))
        .map(|w| w.trim_end_matches(['.', '-']))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whole-word phrase match so that "vp" does not fire inside "mvp" and
/// "cto" does not fire inside "director".
fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase
        .split_whitespace()
        .map(|w| w.trim_end_matches(['.', '-']))
        .collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words.windows(needle.len()).any(|w| w == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csuite_titles() {
        assert_eq!(guess_tier("Jane Doe\nChief Financial Officer, Acme"), Tier::Csuite);
        assert_eq!(guess_tier("Co-Founder & CEO"), Tier::Csuite);
    }

    #[test]
    fn test_exec_titles() {
        assert_eq!(guess_tier("Director of Engineering 2019-2024"), Tier::Exec);
        assert_eq!(guess_tier("VP, Sales"), Tier::Exec);
        assert_eq!(guess_tier("Vice President, Operations"), Tier::Exec);
    }

    #[test]
    fn test_substrings_do_not_match() {
        // "mvp" contains "vp", "director" contains "cto"
        assert_eq!(guess_tier("Shipped the MVP in six weeks"), Tier::Mid);
    }

    #[test]
    fn test_senior_titles() {
        assert_eq!(guess_tier("Senior Software Engineer"), Tier::Senior);
        assert_eq!(guess_tier("Sr. Analyst"), Tier::Senior);
    }

    #[test]
    fn test_years_claim() {
        assert_eq!(guess_tier("Analyst with 9 years of experience"), Tier::Senior);
        assert_eq!(guess_tier("Engineer, 3+ yrs Python"), Tier::Mid);
        assert_eq!(guess_tier("Consultant with 15 years in retail"), Tier::Exec);
    }

    #[test]
    fn test_entry_titles() {
        assert_eq!(guess_tier("Software Engineering Intern, Summer 2024"), Tier::Entry);
        assert_eq!(guess_tier("Recent graduate, B.Sc. Biology"), Tier::Entry);
    }

    #[test]
    fn test_default_is_mid() {
        assert_eq!(guess_tier("Accountant at a regional firm"), Tier::Mid);
        assert_eq!(guess_tier(""), Tier::Mid);
    }
}
