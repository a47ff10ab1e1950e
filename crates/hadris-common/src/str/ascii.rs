//! Character-set predicates for the restricted ASCII subsets used by
//! ECMA-119: `d-characters` (`A-Z0-9_`), `a-characters` (`d-characters` plus
//! a handful of punctuation marks) and the file-name set used within
//! directory records.
//!
//! These are shared primitives; the fixed/variable-length padded string
//! types that use them (`IsoStr`/`IsoString`) live in `hadris-iso` since they
//! also carry ECMA-119 specific layout (space padding, `;version` suffix).

/// `0123456789_` in addition to `A-Z`.
const D_EXTRA: &[u8] = b"0123456789_";
/// Extra punctuation permitted by `a-characters` beyond `d-characters`.
const A_EXTRA: &[u8] = b"!\"%$'()*+,-./:;<=>? ";
/// Extra punctuation permitted within a file identifier (beyond alnum).
const FILE_EXTRA: &[u8] = b"._";

pub fn is_d_char(c: u8) -> bool {
    c.is_ascii_uppercase() || D_EXTRA.contains(&c)
}

pub fn is_a_char(c: u8) -> bool {
    is_d_char(c) || A_EXTRA.contains(&c)
}

pub fn is_file_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || FILE_EXTRA.contains(&c)
}

pub fn is_d_string(s: &[u8]) -> bool {
    s.iter().copied().all(is_d_char)
}

pub fn is_a_string(s: &[u8]) -> bool {
    s.iter().copied().all(is_a_char)
}

/// Upper-cases and replaces characters outside the `d-characters` set with
/// `_`, the substitution ECMA-119 implementations conventionally use when
/// mangling a free-form name into a strict identifier.
#[cfg(feature = "alloc")]
pub fn mangle_to_d_chars(s: &str) -> alloc::vec::Vec<u8> {
    s.bytes()
        .map(|c| {
            let upper = c.to_ascii_uppercase();
            if is_d_char(upper) { upper } else { b'_' }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn d_chars_reject_lowercase() {
        assert!(is_d_char(b'A'));
        assert!(!is_d_char(b'a'));
        assert!(is_d_char(b'_'));
    }

    #[test]
    fn a_chars_allow_punctuation() {
        assert!(is_a_char(b'!'));
        assert!(is_a_char(b' '));
        assert!(!is_a_char(b'@'));
    }

    #[test]
    fn file_chars_allow_dot_and_underscore() {
        assert!(is_file_char(b'.'));
        assert!(is_file_char(b'_'));
        assert!(!is_file_char(b'/'));
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn mangle_replaces_invalid_chars() {
        assert_eq!(mangle_to_d_chars("hello.txt"), b"HELLO_TXT");
    }
}
