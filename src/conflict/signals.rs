//! Heuristic conflict signals: literal extraction, negation, dates,
//! scope qualifiers.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

#[allow(clippy::unwrap_used)]
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([a-z%]+)?").unwrap()
});

#[allow(clippy::unwrap_used)]
static QUOTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"]+)"|'([^']+)'|`([^`]+)`"#).unwrap()
});

#[allow(clippy::unwrap_used)]
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap()
});

/// A numeric value with its unit normalized to a base quantity where the
/// unit family is known (durations to seconds, sizes to bytes).
#[derive(Debug, Clone, PartialEq)]
pub struct NumericValue {
    /// Normalized magnitude.
    pub value: f64,
    /// Unit family after normalization (`"s"`, `"b"`, `"%"`, raw unit, or
    /// empty).
    pub family: String,
}

/// Extracts the first numeric value (with unit) from free text.
#[must_use]
pub fn extract_numeric(text: &str) -> Option<NumericValue> {
    let captures = NUMBER_RE.captures(text)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures
        .get(2)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();
    Some(normalize_unit(value, &unit))
}

fn normalize_unit(value: f64, unit: &str) -> NumericValue {
    let (value, family) = match unit {
        "ms" | "millisecond" | "milliseconds" => (value / 1000.0, "s"),
        "s" | "sec" | "secs" | "second" | "seconds" => (value, "s"),
        "m" | "min" | "mins" | "minute" | "minutes" => (value * 60.0, "s"),
        "h" | "hr" | "hrs" | "hour" | "hours" => (value * 3600.0, "s"),
        "d" | "day" | "days" => (value * 86_400.0, "s"),
        "w" | "week" | "weeks" => (value * 604_800.0, "s"),
        "b" | "byte" | "bytes" => (value, "b"),
        "kb" => (value * 1024.0, "b"),
        "mb" => (value * 1024.0 * 1024.0, "b"),
        "gb" => (value * 1024.0 * 1024.0 * 1024.0, "b"),
        "%" | "percent" => (value, "%"),
        other => (value, other),
    };
    NumericValue {
        value,
        family: family.to_string(),
    }
}

/// Compares numeric values in two object strings.
///
/// Returns a strength and note when both sides carry comparable numbers
/// that disagree. Equal values yield `None` (agreement is not a conflict).
/// The strength is affine-proportional to the normalized distance so that
/// any material divergence lands above 0.5.
#[must_use]
pub fn numeric_divergence(object_a: &str, object_b: &str) -> Option<(f32, String)> {
    let a = extract_numeric(object_a)?;
    let b = extract_numeric(object_b)?;
    if a.family != b.family {
        return None;
    }
    let max = a.value.abs().max(b.value.abs());
    if max < f64::EPSILON {
        return None;
    }
    let distance = (a.value - b.value).abs() / max;
    if distance < f64::EPSILON {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let strength = (0.5 + 0.5 * distance).min(1.0) as f32;
    Some((
        strength,
        format!("numeric values diverge: '{object_a}' vs '{object_b}'"),
    ))
}

/// Compares quoted literals in two object strings; unequal literals are a
/// full-strength conflict.
#[must_use]
pub fn quoted_divergence(object_a: &str, object_b: &str) -> Option<(f32, String)> {
    let a = first_quoted(object_a)?;
    let b = first_quoted(object_b)?;
    if a == b {
        return None;
    }
    Some((
        1.0,
        format!("quoted literals differ: \"{a}\" vs \"{b}\""),
    ))
}

fn first_quoted(text: &str) -> Option<String> {
    let captures = QUOTED_RE.captures(text)?;
    captures
        .iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().to_string())
}

/// Compares ISO dates appearing in two texts.
#[must_use]
pub fn temporal_divergence(text_a: &str, text_b: &str) -> Option<(f32, String)> {
    let a = first_date(text_a)?;
    let b = first_date(text_b)?;
    if a == b {
        return None;
    }
    Some((0.8, format!("dates differ: {a} vs {b}")))
}

fn first_date(text: &str) -> Option<NaiveDate> {
    let m = DATE_RE.captures(text)?;
    NaiveDate::parse_from_str(m.get(1)?.as_str(), "%Y-%m-%d").ok()
}

/// Antonymous predicate pairs for the negation heuristic.
const ANTONYM_PAIRS: &[(&str, &str)] = &[
    ("enabled", "disabled"),
    ("enable", "disable"),
    ("allowed", "forbidden"),
    ("allow", "deny"),
    ("required", "optional"),
    ("requires", "does not require"),
    ("supported", "unsupported"),
    ("supports", "lacks"),
    ("accepts", "rejects"),
    ("includes", "excludes"),
    ("before", "after"),
];

/// Whole-word negation test; substring checks would misread words like
/// "noted" as carrying "not".
fn has_negator(phrase: &str) -> bool {
    if phrase.contains("no longer") {
        return true;
    }
    phrase
        .split_whitespace()
        .any(|w| matches!(w, "not" | "never" | "cannot" | "no") || w.ends_with("n't"))
}

/// Detects direct negation between two predicate (or predicate+object)
/// strings: one side negates the other, or the pair is antonymous.
#[must_use]
pub fn predicates_negate(a: &str, b: &str) -> Option<String> {
    let a_norm = normalize_phrase(a);
    let b_norm = normalize_phrase(b);

    let a_negated = has_negator(&a_norm);
    let b_negated = has_negator(&b_norm);
    if a_negated != b_negated {
        let (plain, negated) = if a_negated {
            (&b_norm, &a_norm)
        } else {
            (&a_norm, &b_norm)
        };
        let stripped = strip_negators(negated);
        if phrases_overlap(plain, &stripped) {
            return Some(format!("'{a}' negates '{b}'"));
        }
    }

    for (x, y) in ANTONYM_PAIRS {
        if (a_norm.contains(x) && b_norm.contains(y)) || (a_norm.contains(y) && b_norm.contains(x))
        {
            return Some(format!("antonymous predicates: '{a}' vs '{b}'"));
        }
    }
    None
}

fn normalize_phrase(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes negator words and the auxiliaries that carry them ("does not
/// support" → "support") so the remainder can be compared to the plain
/// side.
fn strip_negators(s: &str) -> String {
    const DROPPED: &[&str] = &["not", "never", "cannot", "no", "longer", "does", "do", "did"];
    s.split_whitespace()
        .map(|w| w.trim_end_matches("n't"))
        .filter(|w| !w.is_empty() && !DROPPED.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn phrases_overlap(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(b) || b.contains(a) || strsim::normalized_levenshtein(a, b) >= 0.7
}

/// Known scope enumeration families: two qualifiers from the same family
/// with different values are incompatible.
const SCOPE_FAMILIES: &[&[&str]] = &[
    &["linux", "macos", "windows", "freebsd", "android", "ios"],
    &["production", "staging", "development", "test"],
    &["x86", "x86_64", "arm", "arm64", "riscv"],
];

/// Detects incompatible scope qualifiers.
#[must_use]
pub fn scope_divergence(
    qualifier_a: Option<&str>,
    qualifier_b: Option<&str>,
) -> Option<(f32, String)> {
    let a = normalize_phrase(qualifier_a?);
    let b = normalize_phrase(qualifier_b?);
    if a == b {
        return None;
    }

    for family in SCOPE_FAMILIES {
        let a_member = family.iter().find(|v| a.contains(*v));
        let b_member = family.iter().find(|v| b.contains(*v));
        if let (Some(x), Some(y)) = (a_member, b_member) {
            if x != y {
                return Some((0.8, format!("incompatible scopes: '{a}' vs '{b}'")));
            }
            // Same family member on both sides: qualifiers agree enough.
            return None;
        }
    }

    Some((0.5, format!("differing qualifiers: '{a}' vs '{b}'")))
}
