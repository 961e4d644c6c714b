//! # Key Identifiers
//!
//! A [`KeyId`] is the 32-bit number a key is registered under. It travels as
//! the last segment of the request path in hexadecimal, with an optional
//! `0x`/`0X` prefix, and is stored as `0x<lowercase-hex>.key`.
//!
//! Parsing is strict: no whitespace, no sign, no trailing bytes. Any number
//! of hex digits is accepted as long as the value fits in 32 bits, so
//! `0x1`, `0x01` and `0X0001` all name the same artifact, `0x1.key`.

use std::fmt;
use std::str::FromStr;

use crate::error::KeyIdError;

/// Extension of every key artifact.
pub const KEY_EXTENSION: &str = "key";

/// Identifier a key is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl KeyId {
    /// Wrap a raw identifier value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The numeric value.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Parse the identifier out of the final `/`-delimited segment of a
    /// request path, e.g. `/register/0x1a2b`.
    pub fn from_path(path: &str) -> Result<Self, KeyIdError> {
        let (_, segment) = path
            .rsplit_once('/')
            .ok_or_else(|| KeyIdError::MissingSegment(path.to_string()))?;
        segment.parse()
    }

    /// Canonical artifact name: `0x<hex>.key`, lowercase, no leading zeros.
    ///
    /// Every request for the same identifier maps to the same name, which is
    /// what makes exclusive-create a per-identifier lock.
    pub fn file_name(&self) -> String {
        format!("{self}.{KEY_EXTENSION}")
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u32> for KeyId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl FromStr for KeyId {
    type Err = KeyIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() {
            return Err(KeyIdError::Empty);
        }

        let prefix_len = s.len() - digits.len();
        if let Some((offset, found)) = digits.char_indices().find(|(_, c)| !c.is_ascii_hexdigit())
        {
            return Err(KeyIdError::InvalidDigit {
                found,
                offset: prefix_len + offset,
            });
        }

        u32::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| KeyIdError::OutOfRange(s.to_string()))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Formatting then parsing yields the same identifier.
        #[test]
        fn display_roundtrips(value in any::<u32>()) {
            let id = KeyId::new(value);
            prop_assert_eq!(id.to_string().parse::<KeyId>(), Ok(id));
        }

        /// Case and zero padding never change which artifact is targeted.
        #[test]
        fn spelling_does_not_change_file_name(value in any::<u32>(), pad in 0usize..8) {
            let spelled = format!("0X{}{:X}", "0".repeat(pad), value);
            let parsed: KeyId = spelled.parse().unwrap();
            prop_assert_eq!(parsed.file_name(), KeyId::new(value).file_name());
        }

        /// Anything above 32 bits is rejected as out of range.
        #[test]
        fn wide_values_rejected(value in (u32::MAX as u64 + 1)..=u64::MAX) {
            let text = format!("0x{value:x}");
            prop_assert!(matches!(text.parse::<KeyId>(), Err(KeyIdError::OutOfRange(_))));
        }

        /// Arbitrary text never panics the parser.
        #[test]
        fn arbitrary_segments_never_panic(segment in "\\PC{0,16}") {
            let _ = KeyId::from_path(&format!("/register/{segment}"));
        }
    }
}
