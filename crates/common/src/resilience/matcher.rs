//! Error-type matchers for failOn/skipOn/retryOn/abortOn sets

use std::error::Error;
use std::fmt;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// A set of error types, matched against a failure's source chain
///
/// A matcher built for `E` matches a failure when an `E` appears anywhere
/// in the chain formed by the failure and its `source()`s.
#[derive(Clone)]
pub struct ErrorMatcher {
    all: bool,
    entries: Vec<(&'static str, Predicate)>,
}

impl ErrorMatcher {
    /// Matches every failure
    pub fn any() -> Self {
        Self { all: true, entries: Vec::new() }
    }

    /// Matches no failure
    pub fn none() -> Self {
        Self { all: false, entries: Vec::new() }
    }

    /// Matches failures whose chain contains an `E`
    pub fn of<E: Error + 'static>() -> Self {
        Self::none().or::<E>()
    }

    /// Extend the set with `E`
    pub fn or<E: Error + 'static>(mut self) -> Self {
        let predicate: Predicate = Arc::new(|err: &(dyn Error + 'static)| err.is::<E>());
        self.entries.push((std::any::type_name::<E>(), predicate));
        self
    }

    /// Extend the set with an arbitrary predicate over one chain link
    pub fn or_when<F>(mut self, label: &'static str, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(predicate);
        self.entries.push((label, predicate));
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.entries.is_empty()
    }

    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        if self.all {
            return true;
        }
        let mut current = Some(error);
        while let Some(link) = current {
            if self.entries.iter().any(|(_, predicate)| predicate(link)) {
                return true;
            }
            current = link.source();
        }
        false
    }
}

impl Default for ErrorMatcher {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all {
            return f.write_str("ErrorMatcher(*)");
        }
        f.debug_tuple("ErrorMatcher")
            .field(&self.entries.iter().map(|(label, _)| *label).collect::<Vec<_>>())
            .finish()
    }
}
