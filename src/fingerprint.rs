//! Content-addressed identity values.
//!
//! A `Fingerprint` is an `int64` rather than a wider digest for a few
//! convenient properties:
//! - it can be combined independent of order with XOR
//! - it can be stored relatively cheaply
//! - 0 acts as an "identity" value when combined (`5 ^ 0 = 5`)
//! - it is relatively cross-platform (across databases, languages, etc)

use std::fmt;

use serde_derive::{Deserialize, Serialize};

/// A 64-bit identity value with a distinguished *empty* (absent) state.
///
/// Empty is infectious: combining anything with an empty fingerprint yields
/// an empty fingerprint. The identity value (zero) is neutral.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(Option<i64>);

impl Fingerprint {
    pub fn empty() -> Fingerprint {
        Fingerprint(None)
    }

    pub fn identity() -> Fingerprint {
        Fingerprint(Some(0))
    }

    pub fn from_int64(x: i64) -> Fingerprint {
        Fingerprint(Some(x))
    }

    /// Reinterpret the bits as a signed value (two's complement).
    pub fn from_uint64(x: u64) -> Fingerprint {
        Fingerprint(Some(x as i64))
    }

    /// Fingerprint an arbitrary string with Farmhash Fingerprint64.
    pub fn from_string(x: &str) -> Fingerprint {
        Fingerprint::from_uint64(farmhash::fingerprint64(x.as_bytes()))
    }

    pub fn combine(self, other: Fingerprint) -> Fingerprint {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Fingerprint(Some(a ^ b)),
            _ => Fingerprint(None),
        }
    }

    pub fn combine_all<I>(self, others: I) -> Fingerprint
    where
        I: IntoIterator<Item = Fingerprint>,
    {
        others.into_iter().fold(self, Fingerprint::combine)
    }

    pub fn is_empty(self) -> bool {
        self.0.is_none()
    }

    pub fn is_identity(self) -> bool {
        self.0 == Some(0)
    }

    /// The underlying value, or `None` when empty.
    pub fn key(self) -> Option<i64> {
        self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(key) => write!(f, "Fingerprint({})", key),
            None => write!(f, "Fingerprint(empty)"),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(key) => write!(f, "{}", key),
            None => write!(f, "empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    #[test]
    fn test_fingerprint_values() {
        assert_eq!(Fingerprint::from_int64(-5).key(), Some(-5));
        assert_eq!(Fingerprint::from_uint64(5).key(), Some(5));
        // Two's complement reinterpretation.
        assert_eq!(Fingerprint::from_uint64(u64::max_value()).key(), Some(-1));
        assert_eq!(Fingerprint::from_uint64((-5i64) as u64), Fingerprint::from_int64(-5));
        assert_eq!(Fingerprint::identity().key(), Some(0));
        assert_eq!(Fingerprint::empty().key(), None);

        assert!(Fingerprint::empty().is_empty());
        assert!(Fingerprint::identity().is_identity());
        assert!(!Fingerprint::empty().is_identity());
        assert!(!Fingerprint::identity().is_empty());

        // Stable and case sensitive.
        assert_eq!(Fingerprint::from_string("OK"), Fingerprint::from_string("OK"));
        assert_ne!(Fingerprint::from_string("OK"), Fingerprint::from_string("ok"));
    }

    #[test]
    fn test_fingerprint_combine_laws() {
        let (f1, f2, f3) = (
            Fingerprint::from_int64(1),
            Fingerprint::from_int64(2),
            Fingerprint::from_int64(3),
        );
        // Associative.
        assert_eq!(f1.combine(f2.combine(f3)), f1.combine(f2).combine(f3));
        // Commutative.
        assert_eq!(f1.combine(f2), f2.combine(f1));
        // Identity is neutral.
        assert_eq!(f1.combine(Fingerprint::identity()), f1);
        // Self-inverse.
        assert_eq!(f1.combine(f1), Fingerprint::identity());
        // Empty cascades.
        assert!(Fingerprint::empty().combine(f1).is_empty());
        assert!(f1.combine(Fingerprint::empty()).is_empty());
        assert!(f1.combine_all(vec![f2, Fingerprint::empty(), f3]).is_empty());
    }

    #[test]
    fn test_fingerprint_order_independence() {
        let fingerprints: Vec<Fingerprint> = (1..=5).map(Fingerprint::from_int64).collect();
        let combined = Fingerprint::identity().combine_all(fingerprints.iter().copied());
        for permutation in fingerprints.iter().copied().permutations(fingerprints.len()) {
            let (head, tail) = permutation.split_first().unwrap();
            assert_eq!(head.combine_all(tail.iter().copied()), combined);
        }
    }

    #[test]
    fn test_fingerprint_serialization() {
        let fp = Fingerprint::from_int64(42);
        assert_eq!(serde_json::to_string(&fp).unwrap(), "42");
        assert_eq!(serde_json::from_str::<Fingerprint>("42").unwrap(), fp);
        assert_eq!(serde_json::to_string(&Fingerprint::empty()).unwrap(), "null");
        assert_eq!(serde_json::from_str::<Fingerprint>("null").unwrap(), Fingerprint::empty());
    }
}
