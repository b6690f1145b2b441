//! Glob-to-regex translation.
//!
//! Action and resource patterns are written as globs over `:`-separated
//! segments (`urn:resource:deny:*`). The reserved separator gives `*` and
//! `?` single-segment semantics; only the whole-glob `*` and the `:**`
//! sequence cross segment boundaries.

use regex::Regex;

use crate::error::CompileError;

/// Translate a glob into an anchored [`Regex`] matching the same strings.
///
/// Rules, with `:` as the reserved segment separator:
///
/// - the whole glob `*` matches everything, including `:`
/// - elsewhere `*` matches any run of non-`:` characters, `?` exactly one
/// - `{a,b,c}` becomes the alternation `(a|b|c)`; `,` outside braces is
///   literal
/// - `:**` matches across segments (consumed as one token)
/// - `\` escapes the next character; `\\` is a literal backslash
///
/// # Errors
///
/// Returns [`CompileError`] when the translation is not a valid pattern,
/// e.g. for an unbalanced `{`.
pub fn glob_to_regex(glob: &str) -> Result<Regex, CompileError> {
    Regex::new(&translate(glob)).map_err(|source| CompileError {
        glob: glob.to_owned(),
        source,
    })
}

/// Build the anchored pattern string for a glob.
fn translate(glob: &str) -> String {
    // Short-circuit the common catch-all. This is the only place where a
    // bare `*` does not stop at the first `:`.
    if glob == "*" {
        return "^.*$".to_owned();
    }

    let chars: Vec<char> = glob.chars().collect();
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push_str("^(?:");

    let mut escaping = false;
    let mut in_curlies = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        // `:**` is the cross-segment wildcard; all three characters are
        // consumed, including when the sequence ends the glob.
        if !escaping && c == ':' && chars.get(i + 1) == Some(&'*') && chars.get(i + 2) == Some(&'*')
        {
            pattern.push_str(".*");
            i += 3;
            continue;
        }

        match c {
            '.' | '(' | ')' | '|' | '+' | '^' | '$' => {
                pattern.push('\\');
                pattern.push(c);
            }
            '*' => pattern.push_str(if escaping { "\\*" } else { "[^:]*" }),
            '?' => pattern.push_str(if escaping { "\\?" } else { "[^:]" }),
            '{' => {
                if escaping {
                    pattern.push_str("\\{");
                } else {
                    pattern.push('(');
                    in_curlies += 1;
                }
            }
            '}' if in_curlies > 0 && !escaping => {
                pattern.push(')');
                in_curlies -= 1;
            }
            '}' => pattern.push_str("\\}"),
            ',' if in_curlies > 0 && !escaping => pattern.push('|'),
            '\\' => {
                if escaping {
                    pattern.push_str("\\\\");
                }
                escaping = !escaping;
                i += 1;
                continue;
            }
            _ => pattern.push(c),
        }

        escaping = false;
        i += 1;
    }

    pattern.push_str(")$");
    pattern
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn matches(glob: &str, input: &str) -> bool {
        glob_to_regex(glob).unwrap().is_match(input)
    }

    #[test]
    fn bare_star_crosses_segments() {
        assert!(matches("*", "anything"));
        assert!(matches("*", "a:b"));
        assert!(matches("*", ""));
    }

    #[test]
    fn embedded_star_stops_at_colon() {
        assert!(matches("a*", "abc"));
        assert!(matches("a*", "a"));
        assert!(!matches("a*", "a:x"));
        assert!(!matches("*x", "a:x"));
    }

    #[test]
    fn question_mark_matches_one_non_colon_char() {
        assert!(matches("Foo?ar", "FooBar"));
        assert!(matches("Foo?ar", "FooFar"));
        assert!(!matches("Foo?ar", "Fooar"));
        assert!(!matches("Foo?ar", "Foo:ar"));
    }

    #[test]
    fn colon_double_star_crosses_segments() {
        assert!(matches(":**", "x:y:z"));
        assert!(matches("urn:**", "urn:resource:deep:id"));
        assert!(matches("urn:**", "urn"));
    }

    #[test]
    fn curly_alternation() {
        assert!(matches("urn:{a,b}:*", "urn:a:x"));
        assert!(matches("urn:{a,b}:*", "urn:b:y"));
        assert!(!matches("urn:{a,b}:*", "urn:c:x"));
    }

    #[test]
    fn comma_outside_braces_is_literal() {
        assert!(matches("a,b", "a,b"));
        assert!(!matches("a,b", "a"));
    }

    #[test]
    fn metacharacters_are_literal() {
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "axb"));
        assert!(matches("f(x)", "f(x)"));
        assert!(matches("a+b", "a+b"));
        assert!(matches("a|b", "a|b"));
        assert!(matches("^start$", "^start$"));
    }

    #[test]
    fn escapes_make_wildcards_literal() {
        assert!(matches(r"a\*b", "a*b"));
        assert!(!matches(r"a\*b", "axb"));
        assert!(matches(r"a\?b", "a?b"));
        assert!(matches(r"a\\b", r"a\b"));
    }

    #[test]
    fn trailing_escape_is_a_noop() {
        assert!(matches("ab\\", "ab"));
    }

    #[test]
    fn stray_closing_brace_is_literal() {
        assert!(matches("a}b", "a}b"));
    }

    #[test]
    fn unbalanced_open_brace_is_an_error() {
        let err = glob_to_regex("a{b").unwrap_err();
        assert_eq!(err.glob, "a{b");
    }

    #[test]
    fn matching_is_anchored() {
        assert!(!matches("bc", "abcd"));
        assert!(matches("bc", "bc"));
    }
}
