//! Field synthesis from the page transcript.
//!
//! ## Why ordered pattern tables?
//!
//! Every field is driven by one declarative rule table, scanned top to
//! bottom, first match wins. Narrow, organization-specific phrases sit
//! above the generic fallbacks, so priority is the table order itself and
//! not an accident of where a phrase happens to appear in the transcript.
//! A field whose rules all miss resolves to the empty string.
//!
//! Routing and check numbers have no table: body text carries them too
//! unreliably to pattern-match, so they arrive exclusively through the
//! MICR merge, and only into fields the transcript left empty.

use crate::record::{MicrNumbers, RecordFields};
use once_cell::sync::Lazy;
use regex::Regex;

/// One entry in a field's rule table.
struct FieldRule {
    regex: Regex,
    /// Keep only ASCII digits from the match (for label-prefixed rules
    /// like `A/C: 12345678`).
    digits_only: bool,
}

impl FieldRule {
    fn text(pattern: &str) -> Self {
        Self {
            regex: Regex::new(pattern).expect("valid field pattern"),
            digits_only: false,
        }
    }

    fn digits(pattern: &str) -> Self {
        Self {
            regex: Regex::new(pattern).expect("valid field pattern"),
            digits_only: true,
        }
    }
}

static ACCOUNT_NAME_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    vec![
        // Known client; OCR reads the trailing C of "LLC" as G or 6.
        FieldRule::text(r"(?i)THE\s+CANTER\s+GROUP\s+LL[CG6]"),
        FieldRule::text(r"(?i)THE\s+[A-Z\s]{5,30}\s+LL[CG6]"),
        // Personal accounts. Deliberately case-sensitive: uppercase runs
        // stop the match at surrounding mixed-case prose.
        FieldRule::text(r"\b(?:MRS|MR|MS|DR)\.?\s+[A-Z]{2,}(?:\s+[A-Z]{2,}){0,3}\b"),
    ]
});

static ACCOUNT_NUMBER_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    vec![
        FieldRule::text(r"\b\d{8,18}\b"),
        FieldRule::digits(r"(?i)A/C[:\s]*\d+"),
    ]
});

static IFSC_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    // Case-sensitive on purpose: IFSC codes print uppercase, and a relaxed
    // match pulls in ordinary words followed by digits.
    vec![FieldRule::text(r"\b[A-Z]{4}0[A-Z0-9]{6}\b")]
});

static BANK_NAME_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    vec![
        FieldRule::text(r"(?i)CALPRIVATE\s+BANK"),
        FieldRule::text(r"(?i)\b[A-Z]{4,20}\s+BANK\b"),
    ]
});

static BRANCH_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    vec![
        FieldRule::text(r"(?i)LA\s+JOLLA"),
        // "CITY NAME, ST" address fragments.
        FieldRule::text(r"(?i)\b[A-Z]{2,15}\s+[A-Z]{2,15},\s*[A-Z]{2}\b"),
    ]
});

/// Run each field's rule table over the transcript.
pub fn synthesize(text: &str) -> RecordFields {
    RecordFields {
        account_name: first_match(&ACCOUNT_NAME_RULES, text),
        account_number: first_match(&ACCOUNT_NUMBER_RULES, text),
        routing_number: String::new(),
        check_number: String::new(),
        ifsc: first_match(&IFSC_RULES, text),
        bank_name: first_match(&BANK_NAME_RULES, text),
        branch: first_match(&BRANCH_RULES, text),
    }
}

/// Overlay MICR numbers into fields the transcript left empty.
///
/// A value already matched from body text is never overwritten; the MICR
/// line is the fallback authority for numerics, not the override.
pub fn merge_micr(fields: &mut RecordFields, micr: &MicrNumbers) {
    if fields.routing_number.is_empty() {
        fields.routing_number = micr.routing.clone();
    }
    if fields.account_number.is_empty() {
        fields.account_number = micr.account.clone();
    }
    if fields.check_number.is_empty() {
        fields.check_number = micr.check_number.clone();
    }
}

/// Uppercase the free-text fields for consistent storage and search.
pub fn finalize(fields: &mut RecordFields) {
    for field in [
        &mut fields.account_name,
        &mut fields.bank_name,
        &mut fields.branch,
    ] {
        *field = field.to_uppercase();
    }
}

fn first_match(rules: &[FieldRule], text: &str) -> String {
    for rule in rules {
        if let Some(m) = rule.regex.find(text) {
            let value = m.as_str();
            return if rule.digits_only {
                value.chars().filter(|c| c.is_ascii_digit()).collect()
            } else {
                value.trim().to_string()
            };
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_with_personal_account_details() {
        let text = "MR JOHN SMITH requests a transfer.\n\
                    Acct 123456789012 IFSC ABCD0123456\n";
        let fields = synthesize(text);
        assert_eq!(fields.account_name, "MR JOHN SMITH");
        assert_eq!(fields.account_number, "123456789012");
        assert_eq!(fields.ifsc, "ABCD0123456");
        assert_eq!(fields.routing_number, "");
        assert_eq!(fields.check_number, "");
    }

    #[test]
    fn specific_bank_phrase_beats_generic_even_when_later_in_text() {
        let text = "Previously with MEGACORP BANK, now banking at CALPRIVATE BANK.";
        assert_eq!(synthesize(text).bank_name, "CALPRIVATE BANK");
    }

    #[test]
    fn generic_bank_rule_fires_when_the_known_phrase_is_absent() {
        assert_eq!(
            synthesize("Drawn on FIRST NATIONAL BANK of nowhere").bank_name,
            "NATIONAL BANK"
        );
    }

    #[test]
    fn company_name_tolerates_misread_llc() {
        let fields = synthesize("Pay to the order of THE CANTER GROUP LL6");
        assert_eq!(fields.account_name, "THE CANTER GROUP LL6");
    }

    #[test]
    fn generic_company_rule_as_fallback() {
        let fields = synthesize("invoice from THE ACME WIDGET LLC dated");
        assert_eq!(fields.account_name, "THE ACME WIDGET LLC");
    }

    #[test]
    fn branch_from_city_state_fragment() {
        assert_eq!(synthesize("Mailed from SAN DIEGO, CA 92121").branch, "SAN DIEGO, CA");
        assert_eq!(synthesize("LA JOLLA branch office").branch, "LA JOLLA");
    }

    #[test]
    fn labelled_account_number_keeps_digits_only() {
        // Seven digits is below the bare-run rule's floor, so the labelled
        // fallback carries it and sheds the label.
        assert_eq!(synthesize("A/C: 1234567").account_number, "1234567");
    }

    #[test]
    fn ifsc_requires_uppercase() {
        assert_eq!(synthesize("ifsc abcd0123456").ifsc, "");
        assert_eq!(synthesize("IFSC ABCD0123456").ifsc, "ABCD0123456");
    }

    #[test]
    fn unmatched_transcript_yields_all_empty() {
        assert_eq!(synthesize("nothing of interest here"), RecordFields::default());
    }

    #[test]
    fn micr_fills_only_empty_numerics() {
        let micr = MicrNumbers {
            routing: "021000021".into(),
            account: "9999999999".into(),
            check_number: "0456".into(),
            raw: "021000021 9999999999 0456".into(),
        };

        let mut fields = RecordFields {
            account_number: "123456789012".into(),
            ..Default::default()
        };
        merge_micr(&mut fields, &micr);
        assert_eq!(fields.account_number, "123456789012", "text value must survive");
        assert_eq!(fields.routing_number, "021000021");
        assert_eq!(fields.check_number, "0456");

        let mut empty = RecordFields::default();
        merge_micr(&mut empty, &micr);
        assert_eq!(empty.account_number, "9999999999");
    }

    #[test]
    fn finalize_uppercases_free_text_fields() {
        let mut fields = RecordFields {
            account_name: "the canter group llc".into(),
            bank_name: "CalPrivate Bank".into(),
            branch: "la jolla".into(),
            account_number: "123456789012".into(),
            ..Default::default()
        };
        finalize(&mut fields);
        assert_eq!(fields.account_name, "THE CANTER GROUP LLC");
        assert_eq!(fields.bank_name, "CALPRIVATE BANK");
        assert_eq!(fields.branch, "LA JOLLA");
        assert_eq!(fields.account_number, "123456789012");
    }
}
