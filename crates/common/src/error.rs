use thiserror::Error;

/// Broad classification of an [`Error`], used by callers that map failures
/// onto transport-level responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or conflicting setup (default handler, duplicate ids).
    Configuration,
    /// Something named at runtime could not be resolved.
    Resolution,
    /// A model, tool, or matcher invocation failed, or the request was cancelled.
    Execution,
    /// The handoff chain did not terminate within the configured hop limit.
    Handoff,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("no default agent configured; set a default agent or ensure an intent matches")]
    NoDefaultHandler,

    #[error("{kind} already registered: {id}")]
    DuplicateRegistration { kind: &'static str, id: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no handler registered for action type: {0}")]
    UnhandledActionType(String),

    #[error("function action handler not implemented (function: {0})")]
    FunctionNotImplemented(String),

    #[error("handler not found: {0}")]
    HandlerNotFound(String),

    #[error("default handler not found: {0}")]
    DefaultHandlerNotFound(String),

    #[error("{context}: {source}")]
    Execution {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("handoff limit of {limit} exceeded: {}", chain.join(" -> "))]
    HandoffLimitExceeded { limit: usize, chain: Vec<String> },

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        Self::DuplicateRegistration {
            kind,
            id: id.into(),
        }
    }

    /// Wrap a capability failure (model, tool, matcher) with context.
    #[must_use]
    pub fn execution(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Execution {
            context: context.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoDefaultHandler | Self::DuplicateRegistration { .. } | Self::InvalidConfig(_) => {
                ErrorKind::Configuration
            },
            Self::UnhandledActionType(_)
            | Self::FunctionNotImplemented(_)
            | Self::HandlerNotFound(_)
            | Self::DefaultHandlerNotFound(_) => ErrorKind::Resolution,
            Self::Execution { .. } | Self::Cancelled | Self::DeadlineExceeded | Self::Message(_) => {
                ErrorKind::Execution
            },
            Self::HandoffLimitExceeded { .. } => ErrorKind::Handoff,
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Shared context trait ────────────────────────────────────────────────────

/// Trait for error types that can be constructed from a plain message string.
///
/// Implement this for your crate's error type, then invoke [`impl_context!`]
/// in your error module to get `.context()` and `.with_context()` on `Result`
/// and `Option`.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait with `.context()` and `.with_context()`
/// methods on `Result` and `Option`.
///
/// Invoke inside a module that defines `Error: FromMessage` and
/// `type Result<T> = std::result::Result<T, Error>`.
///
/// ```ignore
/// // in crates/foo/src/error.rs
/// switchyard_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let ctx = context.into();
                self.map_err(|source| {
                    <Error as $crate::FromMessage>::from_message(format!("{ctx}: {source}"))
                })
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    let ctx = f().into();
                    <Error as $crate::FromMessage>::from_message(format!("{ctx}: {source}"))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(context.into()))
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}
