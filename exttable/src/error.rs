//! Error type shared by every ingestion, scheduling and upload operation.
//!
//! [`EtlError`] records a classification ([`ErrorKind`]), a static description, optional dynamic
//! detail and source, the call site that raised it and a captured backtrace. Several failures can
//! be aggregated into one value when a caller needs to report all of them together.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Result alias used across the crate.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Error raised by external-table operations.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Several independent failures, for example one per table during a scan.
    Many {
        errors: Vec<EtlError>,
        location: &'static Location<'static>,
    },
}

/// Classification of an [`EtlError`].
///
/// Callers branch on the kind to decide whether a failure is fatal to one call, recorded as a
/// failed run, or logged and ignored.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Schema & Mapping Errors
    SchemaError,
    ValidationError,

    // Operation Policy Errors
    InvalidOperation,

    // Listener Errors
    TransportError,

    // Destination Errors
    DestinationQueryFailed,
    ReconciliationError,

    // Store Errors
    StoreQueryFailed,
    StoreConnectionFailed,
    StagingStoreMissing,

    // Data & Transformation Errors
    InvalidData,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    DeserializationError,

    // State & Workflow Errors
    InvalidState,
    SchedulerTaskPanic,
    NotificationFailed,

    /// Kind reported by an aggregate holding no errors.
    Unknown,
}

impl EtlError {
    /// Returns the kind of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.kind,
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(EtlError::kind)
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every kind contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match &self.repr {
            ErrorRepr::Single(payload) => vec![payload.kind],
            ErrorRepr::Many { errors, .. } => errors.iter().flat_map(EtlError::kinds).collect(),
        }
    }

    pub fn description(&self) -> &str {
        match &self.repr {
            ErrorRepr::Single(payload) => &payload.description,
            ErrorRepr::Many { .. } => "multiple errors",
        }
    }

    /// Returns the dynamic detail, or the first detail found in an aggregate.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.detail.as_deref(),
            ErrorRepr::Many { errors, .. } => errors.iter().find_map(EtlError::detail),
        }
    }

    /// Returns the aggregated errors, if this is an aggregate.
    pub fn errors(&self) -> Option<&[EtlError]> {
        match &self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { errors, .. } => Some(errors),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match &self.repr {
            ErrorRepr::Single(payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error.
    ///
    /// Ignored on aggregates, which expose their first error as the source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(payload) = &mut self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn wrap<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Hash for EtlError {
    /// Hashes only the kind and static description so repeated occurrences group together.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    if detail.trim().is_empty() {
                        write!(f, "\n  Detail: <empty>")?;
                    } else {
                        write_indented_block(f, "Detail", detail)?;
                    }
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented_block(f, "Backtrace", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {count} error{} aggregated @ {}:{}:{}",
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    return write!(f, "\n  (no inner errors provided)");
                }

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_indented_block(f: &mut fmt::Formatter<'_>, title: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {title}:")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }
    Ok(())
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors; a single error is returned unwrapped.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();
        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        EtlError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::wrap(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        match err.classify() {
            serde_json::error::Category::Io => {
                EtlError::wrap(ErrorKind::IoError, "JSON I/O operation failed", err)
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => EtlError::wrap(
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
                err,
            ),
        }
    }
}

/// Every HTTP failure while talking to a listener counts as a transport failure.
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let description = if err.is_timeout() {
            "Listener request timed out"
        } else if err.is_status() {
            "Listener returned an error status"
        } else if err.is_connect() {
            "Listener connection failed"
        } else {
            "Listener request failed"
        };

        EtlError::wrap(ErrorKind::TransportError, description, err)
    }
}

impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let kind = match &err {
            sqlx::Error::Io(_) => ErrorKind::IoError,
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                ErrorKind::StoreConnectionFailed
            }
            _ => ErrorKind::StoreQueryFailed,
        };

        EtlError::wrap(kind, "Database operation failed", err)
    }
}

impl From<sqlx::migrate::MigrateError> for EtlError {
    #[track_caller]
    fn from(err: sqlx::migrate::MigrateError) -> EtlError {
        EtlError::wrap(ErrorKind::StoreQueryFailed, "Database migration failed", err)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;
    use crate::{bail, etl_error};

    fn hash_of(err: &EtlError) -> u64 {
        let mut hasher = DefaultHasher::new();
        err.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn display_includes_kind_description_and_detail() {
        let err = etl_error!(
            ErrorKind::SchemaError,
            "Delete requires key columns",
            "table 'orders' has no key mapping"
        );
        let rendered = err.to_string();

        assert!(rendered.starts_with("[SchemaError] Delete requires key columns @ "));
        assert!(rendered.contains("Detail:\n    table 'orders' has no key mapping"));
        assert_eq!(err.detail(), Some("table 'orders' has no key mapping"));
    }

    #[test]
    fn hash_ignores_detail() {
        let a = etl_error!(ErrorKind::TransportError, "Listener request failed", "a");
        let b = etl_error!(ErrorKind::TransportError, "Listener request failed", "b");
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn single_error_vector_is_not_wrapped() {
        let err = EtlError::from(vec![etl_error!(ErrorKind::InvalidData, "bad")]);
        assert!(err.errors().is_none());
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn aggregate_flattens_kinds() {
        let err = EtlError::from(vec![
            etl_error!(ErrorKind::SchemaError, "first"),
            etl_error!(ErrorKind::ValidationError, "second"),
        ]);

        assert_eq!(err.kind(), ErrorKind::SchemaError);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::SchemaError, ErrorKind::ValidationError]
        );
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn bail_returns_early() {
        fn check(flag: bool) -> EtlResult<u8> {
            if flag {
                bail!(ErrorKind::InvalidOperation, "flag set");
            }
            Ok(1)
        }

        assert_eq!(check(false).unwrap(), 1);
        assert_eq!(check(true).unwrap_err().kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn json_syntax_errors_are_deserialization_errors() {
        let err: EtlError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn pool_exhaustion_is_a_connection_failure() {
        let timed_out: EtlError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(timed_out.kind(), ErrorKind::StoreConnectionFailed);

        let missing: EtlError = sqlx::Error::RowNotFound.into();
        assert_eq!(missing.kind(), ErrorKind::StoreQueryFailed);
    }

    #[test]
    fn empty_aggregate_has_unknown_kind() {
        let err = EtlError::from(Vec::<EtlError>::new());
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.kinds().is_empty());
    }
}
