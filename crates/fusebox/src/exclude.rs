// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

type Matcher = dyn Fn(&(dyn std::error::Error + 'static)) -> Option<bool> + Send + Sync;

/// Classifies a raised error as a non-failure for the circuit.
///
/// Rules are evaluated in order; the first rule whose error type matches decides, even
/// when its predicate returns `false`. An error that matches no rule counts as a failure.
///
/// Type matching uses `dyn Error` downcasting, so a rule built for `E` matches exactly
/// the concrete type `E` of the guarded operation's error.
///
/// # Examples
///
/// ```
/// use fusebox::ExcludeRule;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("http {status}")]
/// struct HttpError {
///     status: u16,
/// }
///
/// // Client-side errors do not trip the circuit, server-side errors do.
/// let rule = ExcludeRule::when(|e: &HttpError| e.status < 500);
/// ```
#[derive(Clone)]
pub struct ExcludeRule {
    matcher: Arc<Matcher>,
}

impl ExcludeRule {
    /// Excludes every error of type `E`.
    #[must_use]
    pub fn of<E: std::error::Error + 'static>() -> Self {
        Self {
            matcher: Arc::new(|err: &(dyn std::error::Error + 'static)| {
                err.downcast_ref::<E>().map(|_| true)
            }),
        }
    }

    /// Excludes errors of type `E` for which `predicate` returns `true`.
    ///
    /// An error of type `E` for which the predicate returns `false` is a failure, and
    /// later rules are not consulted.
    #[must_use]
    pub fn when<E, P>(predicate: P) -> Self
    where
        E: std::error::Error + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            matcher: Arc::new(move |err: &(dyn std::error::Error + 'static)| {
                err.downcast_ref::<E>().map(&predicate)
            }),
        }
    }

    /// Returns `Some(excluded)` when the error's type matches this rule, `None` otherwise.
    pub(crate) fn evaluate(&self, err: &(dyn std::error::Error + 'static)) -> Option<bool> {
        (self.matcher)(err)
    }
}

impl fmt::Debug for ExcludeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExcludeRule").finish_non_exhaustive()
    }
}

/// Evaluates an ordered rule list against an error.
///
/// The first rule matching the error's type decides; rules that do not match on type are
/// skipped.
pub(crate) fn is_excluded(rules: &[ExcludeRule], err: &(dyn std::error::Error + 'static)) -> bool {
    rules.iter().find_map(|rule| rule.evaluate(err)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error)]
    #[error("http {status} error")]
    struct HttpError {
        status: u16,
    }

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(ExcludeRule: Send, Sync, Clone);
    }

    #[test]
    fn excludes_by_type() {
        let rules = [ExcludeRule::of::<Boom>()];
        assert!(is_excluded(&rules, &Boom));
        assert!(!is_excluded(&rules, &HttpError { status: 500 }));
    }

    #[test]
    fn excludes_by_predicate() {
        let rules = [ExcludeRule::when(|e: &HttpError| e.status < 500)];
        assert!(is_excluded(&rules, &HttpError { status: 404 }));
        assert!(!is_excluded(&rules, &HttpError { status: 503 }));
        assert!(!is_excluded(&rules, &Boom));
    }

    #[test]
    fn first_type_match_decides() {
        // The failing predicate matches on type, so the later blanket rule for the same
        // type must never be consulted.
        let rules = [
            ExcludeRule::when(|e: &HttpError| e.status < 500),
            ExcludeRule::of::<HttpError>(),
        ];
        assert!(!is_excluded(&rules, &HttpError { status: 503 }));
        assert!(is_excluded(&rules, &HttpError { status: 404 }));
    }

    #[test]
    fn empty_rule_list_counts_everything() {
        assert!(!is_excluded(&[], &Boom));
    }
}
