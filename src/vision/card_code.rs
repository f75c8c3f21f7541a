//! Card code recognition
//!
//! Finds a printed card identifier such as `OP05-060` in raw OCR text and
//! corrects the misreads OCR engines commonly make on it (`0` for `O` in the
//! set family, `O` for `0` in the digits).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Set families printed on cards. Used to undo look-alike substitutions in
/// the prefix.
const KNOWN_FAMILIES: &[&str] = &["OP", "EB", "ST", "PRB"];

/// Characters OCR returns when it misreads an `O` in the set family.
const O_LOOKALIKES: &[char] = &['0', 'Q', 'D', 'C'];

/// A known family (or an `O` look-alike of one) anywhere on the line, two set
/// digits, optional separator, three card digits. `O` is accepted in digit
/// positions and fixed up afterwards.
static FAMILY_CODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<prefix>[O0QDC]P|EB|ST|PRB)(?P<set>[0-9O]{2})\s*[-—]?\s*(?P<number>[0-9O]{3})")
        .expect("family code pattern is a valid regex")
});

/// Any other 2-4 letter prefix. The letters must start a word so the tail of
/// a longer word is not taken as a family.
static LETTER_CODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Z0-9])(?P<prefix>[A-Z]{2,4})(?P<set>[0-9O]{2})\s*[-—]?\s*(?P<number>[0-9O]{3})(?:[^0-9]|$)")
        .expect("letter code pattern is a valid regex")
});

/// No prefix at all. Needs a separator and must stand alone, so numbers such
/// as power values (`10000`) are not read as codes.
static BARE_CODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Z0-9])(?P<set>[0-9O]{2})(?:\s*[-—]\s*|\s+)(?P<number>[0-9O]{3})(?:[^0-9]|$)")
        .expect("bare code pattern is a valid regex")
});

/// A normalized card identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CardCode {
    set: String,
    number: String,
    full_code: String,
}

impl CardCode {
    /// Build a code from an already-normalized set and card number
    pub fn new(set: impl Into<String>, number: impl Into<String>) -> Self {
        let set = set.into();
        let number = number.into();
        let full_code = format!("{}-{}", set, number);
        Self {
            set,
            number,
            full_code,
        }
    }

    /// Set identifier, e.g. `OP05`
    pub fn set(&self) -> &str {
        &self.set
    }

    /// Card number within the set, e.g. `060`
    pub fn number(&self) -> &str {
        &self.number
    }

    /// Canonical `{set}-{number}` form
    pub fn full_code(&self) -> &str {
        &self.full_code
    }

    /// Both the set's numeric suffix and the card number must be integers.
    pub fn is_valid(&self) -> bool {
        let digits_start = self
            .set
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i);

        let Some(start) = digits_start else {
            return false;
        };

        self.set[start..].parse::<u32>().is_ok() && self.number.parse::<u32>().is_ok()
    }
}

impl fmt::Display for CardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_code)
    }
}

/// Find the first card code in `text`, scanning lines top to bottom.
///
/// Returns `None` when no line contains anything shaped like a code. That is
/// the common case for camera frames and not an error.
pub fn parse(text: &str) -> Option<CardCode> {
    if text.trim().is_empty() {
        return None;
    }

    let upper = text.to_uppercase();
    upper.lines().find_map(parse_line)
}

/// Parse then validate in one step.
pub fn parse_valid(text: &str) -> Option<CardCode> {
    parse(text).filter(CardCode::is_valid)
}

fn parse_line(line: &str) -> Option<CardCode> {
    [&*FAMILY_CODE_PATTERN, &*LETTER_CODE_PATTERN, &*BARE_CODE_PATTERN]
        .into_iter()
        .find_map(|pattern| {
            let caps = pattern.captures(line)?;

            let prefix = caps
                .name("prefix")
                .map(|m| normalize_prefix(m.as_str()))
                .unwrap_or_default();
            let set_digits = normalize_digits(caps.name("set")?.as_str());
            let number = normalize_digits(caps.name("number")?.as_str());

            Some(CardCode::new(format!("{}{}", prefix, set_digits), number))
        })
}

/// Map a raw prefix back onto a known family when it only differs by `O`
/// look-alikes.
fn normalize_prefix(raw: &str) -> String {
    for family in KNOWN_FAMILIES {
        if family.len() == raw.len()
            && family
                .chars()
                .zip(raw.chars())
                .all(|(expected, seen)| expected == seen || (expected == 'O' && O_LOOKALIKES.contains(&seen)))
        {
            return (*family).to_string();
        }
    }
    raw.replace('0', "O")
}

fn normalize_digits(raw: &str) -> String {
    raw.replace('O', "0")
}

/// Human-readable product name for a set code
pub fn set_name(set_code: &str) -> String {
    let specific = match set_code {
        "OP01" => Some("Romance Dawn"),
        "OP02" => Some("Paramount War"),
        "OP03" => Some("Pillars of Strength"),
        "OP04" => Some("Kingdoms of Intrigue"),
        "OP05" => Some("Awakening of the New Era"),
        "OP06" => Some("Wings of the Captain"),
        "OP07" => Some("500 Years into the Future"),
        "OP08" => Some("Two Legends"),
        "OP09" => Some("The Four Emperors"),
        "OP10" => Some("Royal Blood"),
        "EB01" => Some("Memorial Collection"),
        "PRB01" => Some("The Best"),
        "ST01" => Some("Straw Hat Crew"),
        _ => None,
    };
    if let Some(name) = specific {
        return name.to_string();
    }

    let family: String = set_code.chars().filter(|c| !c.is_ascii_digit()).collect();
    let family_name = match family.as_str() {
        "OP" => Some("Booster Pack"),
        "ST" => Some("Starter Deck"),
        "EB" => Some("Extra Booster"),
        "PRB" => Some("Premium Booster"),
        _ => None,
    };

    match family_name {
        Some(name) => format!("{} {}", name, set_code),
        None => set_code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(text: &str) -> Option<String> {
        parse(text).map(|c| c.full_code().to_string())
    }

    #[test]
    fn test_parse_plain_code() {
        let code = parse("OP05-060").unwrap();
        assert_eq!(code.set(), "OP05");
        assert_eq!(code.number(), "060");
        assert_eq!(code.full_code(), "OP05-060");
        assert!(code.is_valid());
    }

    #[test]
    fn test_ocr_misreads_normalize_to_same_code() {
        assert_eq!(full("OP05-060").as_deref(), Some("OP05-060"));
        assert_eq!(full("0P05-060").as_deref(), Some("OP05-060"));
        assert_eq!(full("OPO5-O6O").as_deref(), Some("OP05-060"));
        assert_eq!(full("QP05-060").as_deref(), Some("OP05-060"));
        assert_eq!(full("DP05 - 060").as_deref(), Some("OP05-060"));
    }

    #[test]
    fn test_no_code_found() {
        assert!(parse("").is_none());
        assert!(parse("   ").is_none());
        assert!(parse("HELLO WORLD").is_none());
        assert!(parse("OP5060").is_none());
    }

    #[test]
    fn test_first_matching_line_wins() {
        assert_eq!(
            full("garbage\nOP01-001\nOP02-002").as_deref(),
            Some("OP01-001")
        );
        assert_eq!(full("nothing here\n\nst10-005").as_deref(), Some("ST10-005"));
    }

    #[test]
    fn test_code_embedded_in_text() {
        assert_eq!(
            full("Leader Monkey.D.Luffy op05-060 Straw Hat Crew").as_deref(),
            Some("OP05-060")
        );
    }

    #[test]
    fn test_separator_variants() {
        assert_eq!(full("EB01—012").as_deref(), Some("EB01-012"));
        assert_eq!(full("EB01 012").as_deref(), Some("EB01-012"));
        assert_eq!(full("EB01012").as_deref(), Some("EB01-012"));
        assert_eq!(full("PRB01 - 001").as_deref(), Some("PRB01-001"));
    }

    #[test]
    fn test_prefix_is_optional() {
        let code = parse("no. 05-060").unwrap();
        assert_eq!(code.set(), "05");
        assert_eq!(code.full_code(), "05-060");
        assert!(code.is_valid());
    }

    #[test]
    fn test_code_glued_to_other_text() {
        assert_eq!(full("LUFFYOP05-060").as_deref(), Some("OP05-060"));
        assert_eq!(full("X0P05-060").as_deref(), Some("OP05-060"));
        assert_eq!(full("CharacterOP05-060").as_deref(), Some("OP05-060"));
        assert_eq!(full("5000OP05-060").as_deref(), Some("OP05-060"));
    }

    #[test]
    fn test_family_code_wins_over_earlier_numbers() {
        assert_eq!(full("Power 05-060 ST01-001").as_deref(), Some("ST01-001"));
        assert_eq!(full("ZZ01-002 OP05-060").as_deref(), Some("OP05-060"));
    }

    #[test]
    fn test_power_values_are_not_codes() {
        assert!(parse("10000").is_none());
        assert!(parse("Cost 5 Power 10000").is_none());
        assert!(parse("05-0600").is_none());
        assert_eq!(full("Cost 10000\nOP05-060").as_deref(), Some("OP05-060"));
    }

    #[test]
    fn test_unknown_letter_prefix() {
        assert_eq!(full("XY01-002").as_deref(), Some("XY01-002"));
        assert!(parse("COSTLY05060").is_none());
    }

    #[test]
    fn test_parse_is_deterministic() {
        for text in ["OPO5-O6O", "garbage", "x\nST01-001", ""] {
            assert_eq!(parse(text), parse(text));
        }
    }

    #[test]
    fn test_validate_rejects_missing_digits() {
        assert!(!CardCode::new("OP", "060").is_valid());
        assert!(!CardCode::new("OP05", "06A").is_valid());
        assert!(CardCode::new("OP05", "060").is_valid());
    }

    #[test]
    fn test_parse_valid() {
        assert_eq!(
            parse_valid("scan: OP01-016").map(|c| c.full_code().to_string()),
            Some("OP01-016".to_string())
        );
        assert!(parse_valid("nope").is_none());
    }

    #[test]
    fn test_set_name() {
        assert_eq!(set_name("OP05"), "Awakening of the New Era");
        assert_eq!(set_name("OP11"), "Booster Pack OP11");
        assert_eq!(set_name("ST15"), "Starter Deck ST15");
        assert_eq!(set_name("XY01"), "XY01");
    }
}
