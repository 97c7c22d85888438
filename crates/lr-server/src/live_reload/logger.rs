//! Narrow logging capability used by the reload service.
//!
//! The service only needs two levels. Keeping them behind a trait lets tests
//! observe what was logged without installing a global subscriber.

use std::fmt;

/// Structured key/value fields attached to a log line.
pub type Fields<'a> = &'a [(&'a str, &'a dyn fmt::Display)];

/// Logger used by the reload service.
pub trait Logger: Send + Sync {
    /// Log a debug-level message.
    fn debug(&self, message: &str, fields: Fields<'_>);

    /// Log an error-level message.
    fn error(&self, message: &str, fields: Fields<'_>);
}

/// [`Logger`] forwarding to `tracing` under the `livereload` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str, fields: Fields<'_>) {
        tracing::debug!(target: "livereload", fields = %FieldList(fields), "{message}");
    }

    fn error(&self, message: &str, fields: Fields<'_>) {
        tracing::error!(target: "livereload", fields = %FieldList(fields), "{message}");
    }
}

/// Renders fields as `key=value` pairs separated by spaces.
struct FieldList<'a>(Fields<'a>);

impl fmt::Display for FieldList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_list_format() {
        let path = "/index.html";
        let count = 2;
        let fields: Fields<'_> = &[("path", &path), ("count", &count)];

        assert_eq!(FieldList(fields).to_string(), "path=/index.html count=2");
    }

    #[test]
    fn test_field_list_empty() {
        assert_eq!(FieldList(&[]).to_string(), "");
    }

    #[test]
    fn test_recording_logger_keeps_levels() {
        let logger = testing::RecordingLogger::default();
        logger.debug("first", &[]);
        logger.error("second", &[("error", &"boom")]);

        assert_eq!(
            logger.lines(),
            vec![
                (testing::Level::Debug, "first".to_owned()),
                (testing::Level::Error, "second error=boom".to_owned()),
            ]
        );
    }
}
