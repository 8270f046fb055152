//! Message shapes for executors that run suites out of process.
//!
//! A remote run sends any number of log messages over an opaque channel,
//! then exactly one terminal message: the run result on success or a
//! serialised error. The host treats either terminal variant as
//! end-of-run. Errors travel as `(name, message, stack, cause)` records so
//! a failure in a subprocess or browser tab can be rethrown host-side with
//! its chain intact.

use std::error::Error;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::context::LogLevel;
use crate::runner::RunSuiteResult;
use crate::suite::BoxError;

/// A serialisable error record mirroring an error chain.
///
/// Implements [`Error`] itself, so a deserialised record can be rethrown
/// directly; its `source` is the `cause` chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Error kind label.
    pub name: String,
    /// The display message.
    pub message: String,
    /// A backtrace rendering, when one was captured.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stack: Option<String>,
    /// The wrapped cause, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cause: Option<Box<ErrorObject>>,
}

impl ErrorObject {
    /// Capture an error and its `source` chain.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        Self {
            name: "Error".to_string(),
            message: error.to_string(),
            stack: None,
            cause: error
                .source()
                .map(|source| Box::new(ErrorObject::from_error(source))),
        }
    }

    /// Capture with an explicit kind label.
    pub fn with_name(name: impl Into<String>, error: &(dyn Error + 'static)) -> Self {
        Self {
            name: name.into(),
            ..Self::from_error(error)
        }
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl Error for ErrorObject {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn Error + 'static))
    }
}

/// One message sent from a running suite to its host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// A log line with a millisecond timestamp.
    Log {
        /// Severity.
        level: LogLevel,
        /// Milliseconds since the Unix epoch.
        time: u64,
        /// The text; absent for bare progress ticks.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        log: Option<String>,
    },
    /// A serialised error; terminal.
    Error {
        /// The error chain.
        e: ErrorObject,
    },
    /// The run result; the one terminal message of a successful run.
    Result(Box<RunSuiteResult>),
}

impl ClientMessage {
    /// A log message stamped with the current wall-clock time.
    pub fn log(level: LogLevel, text: impl Into<String>) -> Self {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        ClientMessage::Log {
            level,
            time,
            log: Some(text.into()),
        }
    }

    /// A terminal error message.
    pub fn error(error: &BoxError) -> Self {
        ClientMessage::Error {
            e: ErrorObject::from_error(error.as_ref()),
        }
    }

    /// A terminal result message.
    pub fn result(result: RunSuiteResult) -> Self {
        ClientMessage::Result(Box::new(result))
    }

    /// Whether receiving this message ends the run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClientMessage::Log { .. })
    }
}
