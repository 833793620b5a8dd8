//! MICR digit-stream parsing.
//!
//! The recognizer hands us whatever it read off the band crop, often from
//! two passes concatenated, with stray punctuation where E-13B transit
//! symbols confused it. We reduce that to digit tokens and assign fields by
//! signature specificity: routing first (exactly nine digits is a strong
//! signature), then account, then check number. A token claimed by one
//! field is never reused for another — the real MICR line keeps the three
//! numbers in disjoint positions, so overlapping assignments are always a
//! misread.

use crate::record::MicrNumbers;
use once_cell::sync::Lazy;
use regex::Regex;

static NON_DIGIT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9]+").expect("valid regex"));

/// Parse recognized band text into the three MICR numbers.
///
/// Fields that find no matching token come back as empty strings; `raw`
/// always carries the cleaned digit stream for storage and debugging.
pub fn parse(band_text: &str) -> MicrNumbers {
    let raw = clean(band_text);
    let tokens: Vec<&str> = raw.split(' ').filter(|t| !t.is_empty()).collect();
    let mut claimed = vec![false; tokens.len()];

    let routing = claim_first(&tokens, &mut claimed, |t| t.len() == 9);
    let account = claim_first(&tokens, &mut claimed, |t| (6..=18).contains(&t.len()));
    let check_number = claim_first(&tokens, &mut claimed, |t| (3..=6).contains(&t.len()));

    MicrNumbers {
        routing,
        account,
        check_number,
        raw,
    }
}

/// Strip everything but digits, collapsing the gaps to single spaces.
fn clean(text: &str) -> String {
    NON_DIGIT_RUN.replace_all(text, " ").trim().to_string()
}

/// First unclaimed token satisfying `wanted`, claiming it on match.
fn claim_first(tokens: &[&str], claimed: &mut [bool], wanted: impl Fn(&str) -> bool) -> String {
    for (i, token) in tokens.iter().enumerate() {
        if !claimed[i] && wanted(token) {
            claimed[i] = true;
            return (*token).to_string();
        }
    }
    String::new()
}
