use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use exttable::error::EtlError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type UpdaterResult<T> = Result<T, UpdaterError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the auto-update service.
///
/// Wraps [`EtlError`] for ingestion errors and adds the infrastructure failures of the binary.
#[derive(Debug)]
pub enum UpdaterError {
    Etl(EtlError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl UpdaterError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            UpdaterError::Etl(_) => "updater error",
            UpdaterError::Config(_, _) => "configuration error",
            UpdaterError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            UpdaterError::Etl(err) => err.backtrace(),
            UpdaterError::Config(_, cb) => Some(&cb.0),
            UpdaterError::Io(_, cb) => Some(&cb.0),
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        UpdaterError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("exttable updater failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        if !matches!(self, UpdaterError::Etl(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for UpdaterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdaterError::Etl(err) => write!(f, "{err}"),
            UpdaterError::Config(source, _) => write!(f, "configuration error: {source}"),
            UpdaterError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for UpdaterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            UpdaterError::Etl(err) => err.source(),
            UpdaterError::Config(source, _) => Some(source.as_ref()),
            UpdaterError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for UpdaterError {
    fn from(err: std::io::Error) -> Self {
        UpdaterError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<EtlError> for UpdaterError {
    fn from(err: EtlError) -> Self {
        UpdaterError::Etl(err)
    }
}

#[cfg(test)]
mod tests {
    use exttable::error::ErrorKind;
    use exttable::etl_error;

    use super::*;

    #[test]
    fn report_names_the_category_and_cause() {
        let io = std::io::Error::other("disk gone");
        let report = UpdaterError::from(io).render_report();

        assert!(report.starts_with("exttable updater failed\n"));
        assert!(report.contains("category: i/o error\n"));
        assert!(report.contains("error: i/o error: disk gone\n"));
    }

    #[test]
    fn etl_errors_keep_their_rendering() {
        let err = UpdaterError::from(etl_error!(ErrorKind::ConfigError, "Bad listener settings"));

        assert_eq!(err.category(), "updater error");
        assert!(err.to_string().contains("Bad listener settings"));
    }
}
