//! Deterministic cache keys derived from call arguments.
//!
//! When a cache key is built from a list of arguments rather than
//! supplied directly, each argument is rendered in a type-tagged form
//! (`n` for null, `s:` for strings, `v:` for numbers and booleans),
//! joined with an escaped separator, and hashed to a fixed-length hex
//! digest. The rendering is order-preserving and stable across runs and
//! process restarts, so the same argument sequence always maps to the
//! same Redis key.

use sha2::{Digest, Sha256};

/// One argument of a derived cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    /// An absent argument. Distinct from the string `"n"`.
    Null,
    /// A string argument.
    Str(String),
    /// A scalar argument (number, boolean) in its literal form.
    Value(String),
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => KeyPart::Null,
        }
    }
}

impl From<bool> for KeyPart {
    fn from(v: bool) -> Self {
        KeyPart::Value(v.to_string())
    }
}

macro_rules! key_part_from_number {
    ($($ty:ty),*) => {
        $(impl From<$ty> for KeyPart {
            fn from(v: $ty) -> Self {
                KeyPart::Value(v.to_string())
            }
        })*
    };
}

key_part_from_number!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// Separator-escape a rendered argument: backslashes first, then `|`.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('|', "\\|")
}

/// Hash an argument sequence to a 64-character lowercase hex digest.
pub fn hashed_key<I>(parts: I) -> String
where
    I: IntoIterator<Item = KeyPart>,
{
    let mut rendered = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            rendered.push('|');
        }
        match part {
            KeyPart::Null => rendered.push('n'),
            KeyPart::Str(s) => {
                rendered.push_str("s:");
                rendered.push_str(&escape(&s));
            }
            KeyPart::Value(v) => {
                rendered.push_str("v:");
                rendered.push_str(&escape(&v));
            }
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_across_runs() {
        // Pinned digest: any change here breaks keys written by
        // earlier deployments.
        let digest = hashed_key([KeyPart::from("user"), KeyPart::from(42_i64)]);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hashed_key([KeyPart::from("user"), KeyPart::from(42_i64)]));
        assert_eq!(
            digest,
            "b50ca7040571feff2899b38c5b6476ae2b7caeab0628976ab570c8fb15b345be"
        );
    }

    #[test]
    fn null_differs_from_literal_n() {
        assert_ne!(
            hashed_key([KeyPart::Null]),
            hashed_key([KeyPart::from("n")])
        );
    }

    #[test]
    fn separator_inside_argument_is_escaped() {
        assert_ne!(
            hashed_key([KeyPart::from("a|b")]),
            hashed_key([KeyPart::from("a"), KeyPart::from("b")])
        );
    }

    #[test]
    fn argument_order_matters() {
        assert_ne!(
            hashed_key([KeyPart::from("a"), KeyPart::from("b")]),
            hashed_key([KeyPart::from("b"), KeyPart::from("a")])
        );
    }

    #[test]
    fn string_number_differs_from_numeric_argument() {
        assert_ne!(
            hashed_key([KeyPart::from("42")]),
            hashed_key([KeyPart::from(42_i64)])
        );
    }

    #[test]
    fn option_conversion() {
        let absent: Option<&str> = None;
        assert_eq!(KeyPart::from(absent), KeyPart::Null);
        assert_eq!(KeyPart::from(Some("x")), KeyPart::Str("x".to_string()));
    }
}
