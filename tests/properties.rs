//! Property-based tests for the invariants in §8: parse determinism, key
//! uniqueness, and round-trip identity for the canonical scalar forms.
//! Mirrors the teacher's `proptest!` blocks alongside its lexer tests.

use proptest::prelude::*;

use yamlpack::{pack, PackFlags, ParseContext, ParseFlags};

fn parse(text: &str) -> Option<yamlpack::ParsedDocument> {
    let mut ctx = ParseContext::new(ParseFlags::new());
    ctx.attach_stream(text);
    ctx.parse().ok()
}

proptest! {
    /// Parsing the same input twice produces an identical AST.
    #[test]
    fn parse_is_deterministic(value in -1_000_000i64..1_000_000i64) {
        let text = format!("a: {value}\n");
        let first = parse(&text).expect("plain integer mapping should parse");
        let second = parse(&text).expect("plain integer mapping should parse");
        prop_assert_eq!(first.root, second.root);
    }

    /// A mapping built from distinct alphanumeric keys always round-trips
    /// through parse -> pack without losing or duplicating a key, and a
    /// second parse of the packed output agrees with the first.
    #[test]
    fn distinct_keys_round_trip(names in prop::collection::vec("[a-z][a-z0-9]{0,6}", 1..6)) {
        // Keys must be distinct for this property; skip runs that happen
        // to collide rather than asserting BadKey here (that's covered by
        // s2_duplicate_key_is_bad_key in tests/roundtrip.rs).
        let mut seen = std::collections::HashSet::new();
        prop_assume!(names.iter().all(|n| seen.insert(n.clone())));

        let text = names
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{n}: {i}\n"))
            .collect::<String>();
        let doc = parse(&text).expect("distinct-key mapping should parse");
        let entries = doc.root.as_mapping().expect("root should be a mapping");
        prop_assert_eq!(entries.len(), names.len());

        let repacked = pack(&doc.root, &doc.presentation, PackFlags::default());
        let reparsed = parse(&repacked).expect("repacked mapping should reparse");
        prop_assert_eq!(reparsed.root, doc.root);
    }

    /// A bare integer lexeme, packed back out, reclassifies to the same
    /// numeric value it started as (§8 invariant 2's canonical-form case).
    #[test]
    fn integer_scalar_round_trips(value in -1_000_000i64..1_000_000i64) {
        let text = format!("{value}");
        let doc = parse(&text).expect("bare integer should parse");
        let out = pack(&doc.root, &doc.presentation, PackFlags::default());
        let reparsed = parse(&out).expect("packed integer should reparse");
        prop_assert_eq!(reparsed.root.as_scalar(), doc.root.as_scalar());
    }
}
