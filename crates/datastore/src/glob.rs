//! Minimal `*`/`?` pattern matching for `ListNames` (spec.md §4.3).
//!
//! The wire-level pattern language is deliberately tiny: `*` matches
//! any run of characters (including none), `?` matches exactly one.
//! No character classes, no escaping — matches what `list.go`'s own
//! caller needs and nothing more.

pub fn matches(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    matches_from(&p, &n)
}

fn matches_from(p: &[char], n: &[char]) -> bool {
    match p.first() {
        None => n.is_empty(),
        Some('*') => {
            matches_from(&p[1..], n) || (!n.is_empty() && matches_from(p, &n[1..]))
        }
        Some('?') => !n.is_empty() && matches_from(&p[1..], &n[1..]),
        Some(c) => n.first() == Some(c) && matches_from(&p[1..], &n[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn empty_pattern_matches_empty_name() {
        assert!(matches("", ""));
        assert!(!matches("", "x"));
    }

    #[test]
    fn star_matches_anything() {
        assert!(matches("*", "anything:at:all"));
        assert!(matches("*", ""));
    }

    #[test]
    fn prefix_and_suffix_star() {
        assert!(matches("app.*.counter", "app.requests.counter"));
        assert!(!matches("app.*.counter", "app.requests.gauge"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(matches("app.?.counter", "app.1.counter"));
        assert!(!matches("app.?.counter", "app.12.counter"));
    }

    #[test]
    fn literal_without_wildcards_requires_exact_match() {
        assert!(matches("exact:counter", "exact:counter"));
        assert!(!matches("exact:counter", "exact:counterx"));
    }
}
