//! # Feed Keys
//!
//! A feed is identified either by a single name (`"equipment"`) or by an ordered
//! tuple of names (`["quality-checks", "site-7"]`). Both shapes are represented
//! by [`FeedKey`], which stores the parts in order so that two keys built from
//! the same parts always hash and compare equal.

use std::fmt;

/// # Feed Key
///
/// The unique identity of a polled feed inside a [`FeedRegistry`](crate::core::FeedRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedKey {
    parts: Vec<String>,
}

impl FeedKey {
    /// Builds a key from an ordered sequence of parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// The ordered parts of this key.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// A key is valid when it has at least one part and no part is blank.
    pub fn is_valid(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(|p| !p.trim().is_empty())
    }

    /// The parts joined with `/`, suitable as a relative URL path.
    pub fn to_path(&self) -> String {
        self.parts.join("/")
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join(":"))
    }
}

impl From<&str> for FeedKey {
    fn from(value: &str) -> Self {
        Self::new([value])
    }
}

impl From<String> for FeedKey {
    fn from(value: String) -> Self {
        Self::new([value])
    }
}

impl From<Vec<String>> for FeedKey {
    fn from(parts: Vec<String>) -> Self {
        Self { parts }
    }
}

impl<const N: usize> From<[&str; N]> for FeedKey {
    fn from(parts: [&str; N]) -> Self {
        Self::new(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_tuple_keys() {
        let single = FeedKey::from("equipment");
        assert_eq!(single.parts(), ["equipment"]);
        assert_eq!(single.to_string(), "equipment");

        let tuple = FeedKey::from(["quality-checks", "site-7"]);
        assert_eq!(tuple.to_string(), "quality-checks:site-7");
        assert_eq!(tuple.to_path(), "quality-checks/site-7");
        assert_eq!(tuple, FeedKey::new(vec!["quality-checks".to_string(), "site-7".to_string()]));
    }

    #[test]
    fn validity() {
        assert!(FeedKey::from("dashboard").is_valid());
        assert!(!FeedKey::from("").is_valid());
        assert!(!FeedKey::from("   ").is_valid());
        assert!(!FeedKey::new(Vec::<String>::new()).is_valid());
        assert!(!FeedKey::from(["equipment", ""]).is_valid());
    }
}
