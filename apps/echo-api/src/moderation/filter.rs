//! Chat moderation: redacts contact details and masks denylisted words.
//!
//! Stages run in a fixed order, each consuming the previous stage's output:
//! phone numbers, email addresses, toxic words, then (strict mode only) caps
//! and punctuation normalisation, then trimming.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const PHONE_PLACEHOLDER: &str = "[phone removed]";
pub const EMAIL_PLACEHOLDER: &str = "[email removed]";
pub const FILTERED_MARKER: &str = "[message filtered]";
pub const DEFAULT_MASK: &str = "***";

/// Whole-word denylist, matched case-insensitively.
pub const TOXIC_WORDS: &[&str] = &[
    // Profanity
    "hate", "kill", "suicide", "shit", "fuck", "damn", "hell",
    // Violence and harm
    "murder", "death", "destroy", "attack", "violence", "harm",
    "hurt", "pain", "suffer", "torture", "abuse", "assault",
    // Discrimination
    "racist", "sexist", "homophobic", "transphobic", "bigot",
    // Toxic behaviour
    "toxic", "troll", "spam", "scam", "fraud", "cheat",
    "lie", "liar", "fake", "stupid", "idiot", "moron",
    // Inappropriate content
    "porn", "sex", "nude", "naked", "explicit", "adult",
    // Drugs
    "drug", "cocaine", "heroin", "marijuana", "weed", "alcohol",
    // Harassment
    "bully", "bullying", "harass", "harassment", "threat", "threaten",
    "revenge", "retaliation", "payback", "punishment",
];

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"[0-9]{10,}").expect("phone pattern");
    static ref EMAIL_RE: Regex =
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern");
    static ref TOXIC_RE: Regex = {
        let alternation = TOXIC_WORDS
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("toxic word pattern")
    };
}

const PUNCTUATION: &str = "!@#$%^&*()_+=[]{}|;':\",./<>?`~";

/// Why a message was altered. Declaration order is detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    PhoneNumber,
    EmailAddress,
    ToxicWords,
    ExcessiveCaps,
    ExcessivePunctuation,
    CompletelyFiltered,
}

/// How masked words are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mask {
    /// Replace every match with `***`.
    #[default]
    Fixed,
    /// Replace every match with one `*` per character.
    PreserveLength,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOptions {
    pub mask: Mask,
    /// Also normalise shouting and punctuation runs.
    pub strict: bool,
}

/// Everything the filter learned about one message.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub original: String,
    pub filtered: String,
    pub was_filtered: bool,
    pub reasons: Vec<FilterReason>,
    pub warnings: Vec<String>,
    /// Denylisted words found, in denylist order.
    pub toxic_words_found: Vec<&'static str>,
    pub phone_numbers_removed: usize,
    pub emails_removed: usize,
}

/// Filter with the default options used for persisted and broadcast chat.
pub fn filter_message(text: &str) -> FilterOutcome {
    filter_with(text, FilterOptions::default())
}

pub fn filter_with(text: &str, options: FilterOptions) -> FilterOutcome {
    let mut filtered = text.to_string();
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    let phone_numbers_removed = PHONE_RE.find_iter(&filtered).count();
    if phone_numbers_removed > 0 {
        filtered = PHONE_RE.replace_all(&filtered, PHONE_PLACEHOLDER).into_owned();
        reasons.push(FilterReason::PhoneNumber);
        warnings.push(format!("Removed {phone_numbers_removed} phone number(s)"));
    }

    let emails_removed = EMAIL_RE.find_iter(&filtered).count();
    if emails_removed > 0 {
        filtered = EMAIL_RE.replace_all(&filtered, EMAIL_PLACEHOLDER).into_owned();
        reasons.push(FilterReason::EmailAddress);
        warnings.push(format!("Removed {emails_removed} email address(es)"));
    }

    let (masked, toxic_words_found) = mask_toxic_words(&filtered, options.mask);
    if !toxic_words_found.is_empty() {
        filtered = masked;
        reasons.push(FilterReason::ToxicWords);
        warnings.push(format!(
            "Filtered {} inappropriate word(s)",
            toxic_words_found.len()
        ));
    }

    if options.strict {
        if is_shouting(&filtered) {
            filtered = filtered.to_lowercase();
            reasons.push(FilterReason::ExcessiveCaps);
            warnings.push("Converted excessive caps to lowercase".to_string());
        }

        if let Some(collapsed) = collapse_punctuation(&filtered) {
            filtered = collapsed;
            reasons.push(FilterReason::ExcessivePunctuation);
            warnings.push("Reduced excessive punctuation".to_string());
        }
    }

    let mut filtered = filtered.trim().to_string();
    if filtered.is_empty() && !text.trim().is_empty() {
        filtered = FILTERED_MARKER.to_string();
        reasons.push(FilterReason::CompletelyFiltered);
        warnings.push("Message was completely filtered".to_string());
    }

    FilterOutcome {
        original: text.to_string(),
        filtered,
        was_filtered: !reasons.is_empty(),
        reasons,
        warnings,
        toxic_words_found,
        phone_numbers_removed,
        emails_removed,
    }
}

fn mask_toxic_words(text: &str, mask: Mask) -> (String, Vec<&'static str>) {
    let mut found = Vec::new();
    let masked = TOXIC_RE.replace_all(text, |caps: &Captures| {
        let word = &caps[0];
        let lower = word.to_lowercase();
        if let Some(entry) = TOXIC_WORDS.iter().find(|w| **w == lower) {
            if !found.contains(entry) {
                found.push(*entry);
            }
        }
        match mask {
            Mask::Fixed => DEFAULT_MASK.to_string(),
            Mask::PreserveLength => "*".repeat(word.chars().count()),
        }
    });
    let masked = masked.into_owned();
    found.sort_by_key(|w| TOXIC_WORDS.iter().position(|t| t == w));
    (masked, found)
}

/// More than 70% uppercase letters in a message longer than 10 characters.
fn is_shouting(text: &str) -> bool {
    let total = text.chars().count();
    if total <= 10 {
        return false;
    }
    let upper = text.chars().filter(|c| c.is_ascii_uppercase()).count();
    upper as f64 / total as f64 > 0.7
}

/// Collapse runs of four or more identical punctuation characters to three.
/// Returns `None` when nothing changed.
fn collapse_punctuation(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let mut run = 1;
        while chars.peek() == Some(&c) {
            chars.next();
            run += 1;
        }
        let keep = if run >= 4 && PUNCTUATION.contains(c) {
            changed = true;
            3
        } else {
            run
        };
        out.extend(std::iter::repeat(c).take(keep));
    }

    changed.then_some(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    High,
}

/// Result of the strict "is this appropriate" pre-check.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageValidation {
    pub is_appropriate: bool,
    pub message: String,
    pub warnings: Vec<String>,
    pub severity: Severity,
}

/// Run the strict pipeline. Messages only altered for caps or punctuation
/// still count as appropriate.
pub fn validate_message(text: &str) -> MessageValidation {
    let outcome = filter_with(
        text,
        FilterOptions {
            strict: true,
            ..FilterOptions::default()
        },
    );

    let cosmetic_only = matches!(
        outcome.reasons.as_slice(),
        [FilterReason::ExcessiveCaps] | [FilterReason::ExcessivePunctuation]
    );
    let severity = if !outcome.was_filtered {
        Severity::None
    } else if outcome.reasons.contains(&FilterReason::ToxicWords) {
        Severity::High
    } else {
        Severity::Low
    };

    MessageValidation {
        is_appropriate: !outcome.was_filtered || cosmetic_only,
        message: outcome.filtered,
        warnings: outcome.warnings,
        severity,
    }
}

/// Guidance for the author of a filtered message.
pub fn suggestions(outcome: &FilterOutcome) -> Vec<&'static str> {
    if !outcome.was_filtered {
        return vec!["Your message looks great!"];
    }

    let mut out = Vec::new();
    for reason in &outcome.reasons {
        match reason {
            FilterReason::ToxicWords => {
                out.push("Try expressing your thoughts with more positive language");
                out.push("Consider focusing on constructive feedback");
            }
            FilterReason::PhoneNumber => {
                out.push("For privacy, avoid sharing phone numbers in public chats");
                out.push("Use private messages for sharing contact information");
            }
            FilterReason::EmailAddress => {
                out.push("Keep email addresses private for your security");
                out.push("Use the built-in messaging system to connect");
            }
            FilterReason::ExcessiveCaps => {
                out.push("Try using normal capitalization for better readability");
            }
            FilterReason::ExcessivePunctuation => {
                out.push("Use punctuation sparingly for clearer communication");
            }
            FilterReason::CompletelyFiltered => {}
        }
    }

    if out.is_empty() {
        out.push("Please try rephrasing your message");
    }
    out
}

/// Aggregate counts over a batch of filter outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterStats {
    pub total_messages: usize,
    pub filtered_messages: usize,
    pub clean_messages: usize,
    pub filter_reasons: BTreeMap<FilterReason, usize>,
}

impl FilterStats {
    pub fn collect<'a>(outcomes: impl IntoIterator<Item = &'a FilterOutcome>) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            stats.total_messages += 1;
            if outcome.was_filtered {
                stats.filtered_messages += 1;
            }
            for reason in &outcome.reasons {
                *stats.filter_reasons.entry(*reason).or_default() += 1;
            }
        }
        stats.clean_messages = stats.total_messages - stats.filtered_messages;
        stats
    }

    /// Share of filtered messages, 0.0–100.0.
    pub fn filtered_percentage(&self) -> f64 {
        if self.total_messages == 0 {
            return 0.0;
        }
        self.filtered_messages as f64 / self.total_messages as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_phone_email_and_toxic_words() {
        let out = filter_message("call me 5551234567 or a@b.com, you idiot");
        assert_eq!(
            out.filtered,
            "call me [phone removed] or [email removed], you ***"
        );
        assert_eq!(
            out.reasons,
            vec![
                FilterReason::PhoneNumber,
                FilterReason::EmailAddress,
                FilterReason::ToxicWords
            ]
        );
        assert!(out.was_filtered);
        assert_eq!(out.phone_numbers_removed, 1);
        assert_eq!(out.emails_removed, 1);
        assert_eq!(out.toxic_words_found, vec!["idiot"]);
    }

    #[test]
    fn clean_text_passes_through() {
        let out = filter_message("  good morning streams  ");
        assert_eq!(out.filtered, "good morning streams");
        assert!(!out.was_filtered);
        assert!(out.reasons.is_empty());
    }

    #[test]
    fn toxic_words_match_whole_words_case_insensitively() {
        let out = filter_message("Hello IDIOT friend, shellfish are fine");
        assert_eq!(out.filtered, "Hello *** friend, shellfish are fine");
    }

    #[test]
    fn longer_denylist_words_are_not_split() {
        let out = filter_message("no bullying here");
        assert_eq!(out.filtered, "no *** here");
        assert_eq!(out.toxic_words_found, vec!["bullying"]);
    }

    #[test]
    fn preserve_length_mask() {
        let out = filter_with(
            "what a moron",
            FilterOptions {
                mask: Mask::PreserveLength,
                strict: false,
            },
        );
        assert_eq!(out.filtered, "what a *****");
    }

    #[test]
    fn nine_digits_are_not_a_phone_number() {
        let out = filter_message("order 123456789");
        assert_eq!(out.filtered, "order 123456789");
        assert!(!out.reasons.contains(&FilterReason::PhoneNumber));
    }

    #[test]
    fn message_of_only_whitespace_is_not_marked() {
        let out = filter_message("   ");
        assert_eq!(out.filtered, "");
        assert!(!out.was_filtered);
    }

    #[test]
    fn filter_is_idempotent_on_its_output() {
        for input in [
            "call me 5551234567 or a@b.com, you idiot",
            "HATE hate Hate!!!!",
            "  spaced out  ",
            "ping 1234567890123 now",
        ] {
            let once = filter_message(input).filtered;
            let twice = filter_message(&once).filtered;
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn filter_is_deterministic() {
        let a = filter_message("you stupid liar 0123456789");
        let b = filter_message("you stupid liar 0123456789");
        assert_eq!(a, b);
        assert_eq!(a.toxic_words_found, vec!["liar", "stupid"]);
    }

    #[test]
    fn strict_mode_lowercases_shouting_and_collapses_punctuation() {
        let out = filter_with(
            "WHY IS EVERYONE SO QUIET!!!!!!",
            FilterOptions {
                strict: true,
                ..FilterOptions::default()
            },
        );
        assert_eq!(out.filtered, "why is everyone so quiet!!!");
        assert_eq!(
            out.reasons,
            vec![FilterReason::ExcessiveCaps, FilterReason::ExcessivePunctuation]
        );
    }

    #[test]
    fn strict_mode_leaves_letter_runs_alone() {
        let out = filter_with(
            "sooooo good",
            FilterOptions {
                strict: true,
                ..FilterOptions::default()
            },
        );
        assert_eq!(out.filtered, "sooooo good");
        assert!(!out.was_filtered);
    }

    #[test]
    fn validate_message_severity() {
        assert_eq!(validate_message("lovely day").severity, Severity::None);

        let caps = validate_message("THIS IS SO EXCITING");
        assert!(caps.is_appropriate);
        assert_eq!(caps.severity, Severity::Low);

        let toxic = validate_message("you troll");
        assert!(!toxic.is_appropriate);
        assert_eq!(toxic.severity, Severity::High);

        let email = validate_message("mail me at sea@ocean.org");
        assert!(!email.is_appropriate);
        assert_eq!(email.severity, Severity::Low);
    }

    #[test]
    fn suggestions_follow_reasons() {
        assert_eq!(
            suggestions(&filter_message("hi")),
            vec!["Your message looks great!"]
        );
        let s = suggestions(&filter_message("5551234567"));
        assert!(s[0].contains("phone numbers"));
    }

    #[test]
    fn stats_count_reasons() {
        let outcomes = [
            filter_message("hello"),
            filter_message("you idiot"),
            filter_message("idiot at a@b.com"),
        ];
        let stats = FilterStats::collect(&outcomes);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.filtered_messages, 2);
        assert_eq!(stats.clean_messages, 1);
        assert_eq!(stats.filter_reasons[&FilterReason::ToxicWords], 2);
        assert_eq!(stats.filter_reasons[&FilterReason::EmailAddress], 1);
        assert!((stats.filtered_percentage() - 66.666).abs() < 0.01);
    }
}
