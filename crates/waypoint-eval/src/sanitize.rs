//! Sanitize a frame-local name into a valid script identifier suitable for
//! use as a synthesized entrypoint parameter.
//!
//! This intentionally uses a conservative ASCII-only identifier definition:
//! - start: `_` or `[A-Za-z]`
//! - rest: `_` or `[A-Za-z0-9]`
//!
//! Any other character is replaced with `_`. If the result does not start
//! with a valid start character (e.g. the original name started with a
//! digit), we prefix `_`. Reserved words get a trailing `_` so they can be
//! declared as parameters.

use waypoint_syntax::is_keyword;

#[must_use]
pub fn sanitize_local_name(name: &str) -> String {
    let name = name.trim();

    let mut out: String = name
        .chars()
        .map(|ch| {
            if ch == '_' || ch.is_ascii_alphanumeric() {
                ch
            } else {
                '_'
            }
        })
        .collect();

    if out.is_empty() {
        out.push('_');
        return out;
    }

    if !out
        .chars()
        .next()
        .is_some_and(|ch| ch == '_' || ch.is_ascii_alphabetic())
    {
        out.insert(0, '_');
    }

    if is_keyword(&out) {
        out.push('_');
    }

    out
}

/// Sanitizes every name in order, suffixing later duplicates so each bound
/// parameter stays unique even when distinct surface names collapse to the
/// same identifier.
#[must_use]
pub fn sanitize_unique(names: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = sanitize_local_name(name);
        let mut suffix = 2;
        while out.contains(&candidate) {
            candidate = format!("{}_{suffix}", sanitize_local_name(name));
            suffix += 1;
        }
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keeps_plain_identifiers() {
        assert_eq!(sanitize_local_name("acc"), "acc");
        assert_eq!(sanitize_local_name("_tmp0"), "_tmp0");
    }

    #[test]
    fn replaces_and_prefixes_awkward_characters() {
        assert_eq!(sanitize_local_name("a-b"), "a_b");
        assert_eq!(sanitize_local_name("0count"), "_0count");
        assert_eq!(sanitize_local_name(""), "_");
        assert_eq!(sanitize_local_name("  spaced  "), "spaced");
    }

    #[test]
    fn escapes_reserved_words() {
        assert_eq!(sanitize_local_name("while"), "while_");
        assert_eq!(sanitize_local_name("int"), "int_");
    }

    #[test]
    fn colliding_names_get_unique_suffixes() {
        assert_eq!(
            sanitize_unique(&["a-b", "a+b", "a b"]),
            vec!["a_b", "a_b_2", "a_b_3"]
        );
    }

    fn is_valid_identifier(text: &str) -> bool {
        let mut chars = text.chars();
        let starts_ok = chars
            .next()
            .is_some_and(|ch| ch == '_' || ch.is_ascii_alphabetic());
        starts_ok
            && chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
            && !is_keyword(text)
    }

    proptest! {
        #[test]
        fn always_yields_a_valid_non_reserved_identifier(name in ".{0,24}") {
            let sanitized = sanitize_local_name(&name);
            prop_assert!(is_valid_identifier(&sanitized), "bad output: {sanitized:?}");
        }

        #[test]
        fn sanitize_unique_never_collides(names in prop::collection::vec(".{0,12}", 0..8)) {
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let sanitized = sanitize_unique(&refs);
            let mut deduped = sanitized.clone();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), sanitized.len());
        }
    }
}
