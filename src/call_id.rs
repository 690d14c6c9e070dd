//! Call attempt identifier.

use std::fmt;

/// A 32-bit token identifying one call attempt.
///
/// The initiator generates a random identifier and every signaling message of
/// the attempt carries it. Zero is reserved: legacy peers omit the identifier
/// on the wire, which decodes to zero and matches any call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CallId(pub u32);

impl CallId {
    /// The reserved wildcard value used when a peer sent no identifier.
    pub const WILDCARD: CallId = CallId(0);

    /// Generate a random non-reserved identifier from the OS CSPRNG.
    pub fn generate() -> CallId {
        loop {
            let mut buf = [0u8; 4];
            getrandom::getrandom(&mut buf).expect("OS CSPRNG failed");
            let id = u32::from_be_bytes(buf);
            if id != 0 {
                return CallId(id);
            }
        }
    }

    /// Whether two identifiers refer to the same call attempt.
    ///
    /// The wildcard matches anything; `==` stays strictly numeric so the type
    /// can key maps.
    pub fn is_same(self, other: CallId) -> bool {
        self == other || self.0 == 0 || other.0 == 0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_never_reserved() {
        for _ in 0..64 {
            assert_ne!(CallId::generate(), CallId::WILDCARD);
        }
    }

    #[test]
    fn test_is_same_numeric() {
        assert!(CallId(42).is_same(CallId(42)));
        assert!(!CallId(42).is_same(CallId(43)));
    }

    #[test]
    fn test_wildcard_matches_any() {
        assert!(CallId::WILDCARD.is_same(CallId(42)));
        assert!(CallId(42).is_same(CallId::WILDCARD));
        assert!(CallId::WILDCARD.is_same(CallId::WILDCARD));
    }

    #[test]
    fn test_equality_stays_numeric() {
        assert_ne!(CallId::WILDCARD, CallId(42));
    }
}
