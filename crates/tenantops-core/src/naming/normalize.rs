//! Name normalization rules.
//!
//! Every resource kind has a charset and a length limit imposed by the
//! backend. Normalization is purely in-memory and deterministic:
//! - ASCII lowercase
//! - separators (`-`, `_`, `.`, space) become `-` where the kind allows it
//! - any other disallowed character is dropped
//! - repeated `-` collapse, leading/trailing `-` are trimmed
//!
//! Over-long names are truncated and suffixed with a short content hash so
//! two long inputs sharing a prefix still map to different names.

use super::hashing::short_hash_hex;

/// Hex characters of the hash suffix appended on truncation.
pub const HASH_SUFFIX_LEN: usize = 8;

/// Naming constraints for one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameRule {
    pub min_len: usize,
    pub max_len: usize,
    /// `-` may appear inside the name.
    pub allow_hyphen: bool,
    /// Extra punctuation kept verbatim (besides `a-z0-9` and `-`).
    pub extra: &'static [char],
}

impl NameRule {
    fn keeps(&self, c: char) -> bool {
        c.is_ascii_lowercase() || c.is_ascii_digit() || self.extra.contains(&c)
    }
}

/// Normalize `input` under `rule` without applying the length limit.
pub fn normalize(input: &str, rule: &NameRule) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let c = c.to_ascii_lowercase();
        if rule.keeps(c) {
            out.push(c);
        } else if matches!(c, '-' | '_' | '.' | ' ') && rule.allow_hyphen {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Truncate with a hash suffix if `name` exceeds the rule's limit.
///
/// The hash covers the full normalized name, so the result is still a pure
/// function of the input.
pub fn fit(name: &str, rule: &NameRule) -> String {
    if name.len() <= rule.max_len {
        return name.to_string();
    }

    let hash = short_hash_hex(name.as_bytes(), HASH_SUFFIX_LEN);
    if rule.allow_hyphen {
        let keep = rule.max_len - HASH_SUFFIX_LEN - 1;
        let head = name[..keep].trim_end_matches('-');
        format!("{head}-{hash}")
    } else {
        let keep = rule.max_len - HASH_SUFFIX_LEN;
        format!("{}{hash}", &name[..keep])
    }
}

/// Normalize then fit.
pub fn canonical(input: &str, rule: &NameRule) -> String {
    fit(&normalize(input, rule), rule)
}

/// True if `name` is already in canonical form for `rule`.
///
/// Used to vet manually configured names: normalizing must be a no-op and the
/// name must fit.
pub fn is_canonical(name: &str, rule: &NameRule) -> bool {
    name.len() >= rule.min_len && name.len() <= rule.max_len && normalize(name, rule) == name
}

#[cfg(test)]
mod tests {
    use super::*;

    const HYPHEN: NameRule = NameRule {
        min_len: 3,
        max_len: 20,
        allow_hyphen: true,
        extra: &[],
    };

    const ALNUM: NameRule = NameRule {
        min_len: 3,
        max_len: 12,
        allow_hyphen: false,
        extra: &[],
    };

    #[test]
    fn separators_and_case() {
        assert_eq!(normalize("My Space", &HYPHEN), "my-space");
        assert_eq!(normalize("my__space", &HYPHEN), "my-space");
        assert_eq!(normalize("  my..space  ", &HYPHEN), "my-space");
        assert_eq!(normalize("My-Space!", &ALNUM), "myspace");
    }

    #[test]
    fn extra_chars_are_kept() {
        let rule = NameRule {
            extra: &['_'],
            ..HYPHEN
        };
        assert_eq!(normalize("a_b c", &rule), "a_b-c");
    }

    #[test]
    fn fit_truncates_with_hash() {
        let long = "abcdefghijklmnopqrstuvwxyz";
        let a = fit(long, &HYPHEN);
        assert_eq!(a.len(), 20);
        assert_eq!(&a[..11], "abcdefghijk");
        assert_eq!(a.as_bytes()[11], b'-');

        let b = fit(long, &ALNUM);
        assert_eq!(b.len(), 12);
        assert!(b.starts_with("abcd"));
    }

    #[test]
    fn fit_distinguishes_shared_prefixes() {
        let a = fit("abcdefghijklmnopqrstuvwxyz-one", &HYPHEN);
        let b = fit("abcdefghijklmnopqrstuvwxyz-two", &HYPHEN);
        assert_ne!(a, b);
    }

    #[test]
    fn canonical_check() {
        assert!(is_canonical("my-space", &HYPHEN));
        assert!(!is_canonical("My-Space", &HYPHEN));
        assert!(!is_canonical("ab", &HYPHEN));
        assert!(!is_canonical("my-space", &ALNUM));
    }
}
