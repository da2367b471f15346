//! Property-based invariants for the parser, SQL helpers, and vector
//! normalization.

use doctrine::embedding::{dot, normalize};
use doctrine::parser::parse_document;
use doctrine::storage::{escape_like_wildcards, glob_to_like_pattern};
use proptest::prelude::*;

proptest! {
    /// Every parsed section's byte range lies within the input, ranges
    /// are ordered, and at least one section is always produced.
    #[test]
    fn parser_byte_ranges_are_in_bounds(raw in ".{0,2000}") {
        let parsed = parse_document(&raw, "fallback");
        prop_assert!(!parsed.sections.is_empty());
        for section in &parsed.sections {
            let (start, end) = section.byte_range;
            prop_assert!(start <= end);
            prop_assert!(end <= raw.len());
            prop_assert!(raw.is_char_boundary(start));
            prop_assert!(raw.is_char_boundary(end));
            prop_assert!((1..=6).contains(&section.level));
        }
    }

    /// Section byte ranges never overlap and appear in document order.
    #[test]
    fn parser_sections_are_ordered(raw in "(#{1,3} [a-z ]{1,20}\n[a-z \n]{0,100}){0,8}") {
        let parsed = parse_document(&raw, "fallback");
        for pair in parsed.sections.windows(2) {
            prop_assert!(pair[0].byte_range.1 <= pair[1].byte_range.0);
        }
    }

    /// The parser is pure: identical input gives identical output.
    #[test]
    fn parser_is_deterministic(raw in ".{0,500}") {
        prop_assert_eq!(
            parse_document(&raw, "x"),
            parse_document(&raw, "x")
        );
    }

    /// Escaped LIKE strings contain no unescaped wildcards.
    #[test]
    fn like_escaping_neutralizes_wildcards(s in ".{0,100}") {
        let escaped = escape_like_wildcards(&s);
        let bytes = escaped.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            if b == b'%' || b == b'_' {
                prop_assert!(i > 0 && bytes[i - 1] == b'\\');
            }
        }
    }

    /// Glob conversion never produces raw glob characters.
    #[test]
    fn glob_conversion_removes_glob_wildcards(s in ".{0,100}") {
        let like = glob_to_like_pattern(&s);
        prop_assert!(!like.contains('*'));
        prop_assert!(!like.contains('?'));
    }

    /// Normalized non-zero vectors have unit length.
    #[test]
    fn normalization_yields_unit_vectors(values in prop::collection::vec(-100.0f32..100.0, 1..64)) {
        let mut v = values;
        normalize(&mut v);
        let norm = dot(&v, &v).sqrt();
        // Zero vectors stay zero; everything else lands on the unit sphere.
        prop_assert!(norm < 1e-3 || (norm - 1.0).abs() < 1e-3);
    }
}
