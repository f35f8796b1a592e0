//! Interned names for types, objects, predicates and actions.

use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::sync::{Arc, Mutex};

lazy_static::lazy_static! {
    /// Deduplicates name strings; PDDL tasks repeat the same identifiers
    /// thousands of times across atoms and operators.
    static ref INTERNED: Mutex<Vec<Arc<String>>> = Mutex::new(Vec::default());
}

/// An identifier from the planning description. Cheap to clone and compare;
/// the underlying string is interned.
#[derive(Clone, Eq, PartialEq, Hash, Default)]
pub struct Name(Arc<String>);

impl Name {
    pub fn new<S: Into<String> + AsRef<str>>(name: S) -> Self {
        let mut guard = INTERNED.lock().expect("name intern table poisoned");
        let name_ref = name.as_ref();
        let pos = match guard.binary_search_by(|n| n.as_str().cmp(name_ref)) {
            Ok(pos) => pos,
            Err(pos) => {
                guard.insert(pos, Arc::new(name.into()));
                pos
            }
        };
        Self(guard[pos].clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for Name
where
    T: Into<String> + AsRef<str>,
{
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_str() == *other
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.as_str().cmp(other.0.as_str())
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let a = Name::new("intern-test-loc");
        let b = Name::new("intern-test-loc");
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, "intern-test-loc");
    }
}
