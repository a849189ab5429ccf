//! [`TracedError`]: an error tagged with the source site that produced it.
//!
//! The site plus the rendered message form a stable identity, so repeated
//! failures from the same place can be counted instead of stored again.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;

use sha2::{Digest, Sha256};

/// Error carrying its origin (`file:line:column`) and, for recovered panics,
/// a backtrace captured at the recovery point.
///
/// Constructors are `#[track_caller]`, and so is the blanket `From` impl, so
/// `?` on any `std::error::Error` records the location of the `?` itself.
/// `TracedError` does not implement `std::error::Error`: it would overlap
/// the blanket conversion.
pub struct TracedError {
    message: String,
    location: &'static Location<'static>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    backtrace: Option<String>,
}

impl TracedError {
    /// Error from a plain message.
    #[track_caller]
    pub fn msg(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
            location: Location::caller(),
            source: None,
            backtrace: None,
        }
    }

    /// Wrap an existing error, keeping it as the source.
    #[track_caller]
    pub fn wrap<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            location: Location::caller(),
            source: Some(Box::new(error)),
            backtrace: None,
        }
    }

    /// Build from a panic payload. A payload that already is a
    /// `TracedError` is returned as-is.
    #[track_caller]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<TracedError>() {
            Ok(traced) => *traced,
            Err(payload) => Self {
                message: format!("panic: {}", panic_message(payload.as_ref())),
                location: Location::caller(),
                source: None,
                backtrace: Some(Backtrace::force_capture().to_string()),
            },
        }
    }

    /// Stable identity: first 8 bytes of SHA-256 over site and message.
    pub fn id(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.site().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.message.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(head)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// `file:line:column` of the originating site.
    pub fn site(&self) -> String {
        format!(
            "{}:{}:{}",
            self.location.file(),
            self.location.line(),
            self.location.column()
        )
    }

    pub fn backtrace(&self) -> Option<&str> {
        self.backtrace.as_deref()
    }

    pub fn source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

impl<E> From<E> for TracedError
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn from(error: E) -> Self {
        Self::wrap(error)
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.message, self.site())
    }
}

impl fmt::Debug for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedError")
            .field("message", &self.message)
            .field("site", &self.site())
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Extract a printable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else if let Some(traced) = payload.downcast_ref::<TracedError>() {
        traced.message()
    } else {
        "unknown panic payload"
    }
}
