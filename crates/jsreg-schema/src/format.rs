//! # Format Plugins
//!
//! A [`SchemaFormat`] names a string format (`"format": "<name>"` in a
//! schema) and the check that decides whether a string matches it.
//!
//! Checks are either synchronous, in which case the engine runs them during
//! its own pass, or asynchronous. Asynchronous checks run after the
//! synchronous pass and make the validation outcome deferred.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// Answer of a format check: available now, or still pending.
pub enum FormatCheck {
    /// The check completed.
    Ready(bool),
    /// The check is still running.
    Deferred(BoxFuture<'static, bool>),
}

impl FormatCheck {
    /// Await the answer regardless of which form the formatter chose.
    pub async fn resolve(self) -> bool {
        match self {
            Self::Ready(matches) => matches,
            Self::Deferred(pending) => pending.await,
        }
    }
}

impl From<bool> for FormatCheck {
    fn from(matches: bool) -> Self {
        Self::Ready(matches)
    }
}

impl fmt::Debug for FormatCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(matches) => f.debug_tuple("Ready").field(matches).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Decides whether a string conforms to a named format.
pub trait SchemaFormatter: Send + Sync {
    /// Check `data`.
    fn validate(&self, data: &str) -> FormatCheck;

    /// Returns true if [`SchemaFormatter::validate`] may return
    /// [`FormatCheck::Deferred`]. A synchronous formatter that defers anyway
    /// is treated as a failed match.
    fn is_async(&self) -> bool {
        false
    }
}

struct SyncFormatter<F>(F);

impl<F> SchemaFormatter for SyncFormatter<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn validate(&self, data: &str) -> FormatCheck {
        FormatCheck::Ready((self.0)(data))
    }
}

struct DeferredFormatter<F>(F);

impl<F, Fut> SchemaFormatter for DeferredFormatter<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    fn validate(&self, data: &str) -> FormatCheck {
        FormatCheck::Deferred(Box::pin((self.0)(data.to_string())))
    }

    fn is_async(&self) -> bool {
        true
    }
}

/// A named format registered with a registry.
#[derive(Clone)]
pub struct SchemaFormat {
    /// Value of the `format` keyword this check applies to.
    pub name: String,
    /// The check itself.
    pub formatter: Arc<dyn SchemaFormatter>,
}

impl SchemaFormat {
    /// Wrap an existing formatter.
    pub fn new(name: impl Into<String>, formatter: Arc<dyn SchemaFormatter>) -> Self {
        Self {
            name: name.into(),
            formatter,
        }
    }

    /// A format checked synchronously by `check`.
    pub fn sync<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(SyncFormatter(check)))
    }

    /// A format checked by the future `check` returns.
    pub fn deferred<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self::new(name, Arc::new(DeferredFormatter(check)))
    }

    /// Returns true if the check may suspend.
    pub fn is_async(&self) -> bool {
        self.formatter.is_async()
    }

    /// Run the check as the engine's synchronous pass sees it.
    pub(crate) fn check_now(&self, data: &str) -> bool {
        matches!(self.formatter.validate(data), FormatCheck::Ready(true))
    }
}

impl fmt::Debug for SchemaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaFormat")
            .field("name", &self.name)
            .field("async", &self.is_async())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_format_answers_immediately() {
        let format = SchemaFormat::sync("even-length", |s| s.len() % 2 == 0);
        assert!(!format.is_async());
        assert!(format.check_now("ab"));
        assert!(!format.check_now("abc"));
    }

    #[tokio::test]
    async fn deferred_format_resolves_through_future() {
        let format = SchemaFormat::deferred("known-user", |s| async move { s == "alice" });
        assert!(format.is_async());
        assert!(format.formatter.validate("alice").resolve().await);
        assert!(!format.formatter.validate("mallory").resolve().await);
    }

    #[test]
    fn deferred_answer_fails_the_synchronous_pass() {
        let format = SchemaFormat::deferred("anything", |_| async { true });
        assert!(!format.check_now("x"));
    }
}
