//! Error values for the runtime.
//!
//! Errors are first-class values, not panics: they are raised explicitly,
//! travel through cells, and surface at suspension points. The runtime
//! reserves panics for invariant violations (double resolution of a cell,
//! re-entrant task resumption).

use core::fmt;

/// The kind of error carried by an [`Error`].
///
/// Each kind has a stable snake_case name, a human description, and a
/// stable numeric code. The set is non-exhaustive; new kinds may be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// All promise-side references were dropped before a value was sent.
    BrokenPromise,
    /// A cell was resolved twice.
    FutureAlreadySet,
    /// The actor's output future was dropped while the actor was suspended.
    ActorCancelled,
    /// The producer side of a stream closed with no value pending.
    EndOfStream,
    /// An offloaded action was discarded before it could run.
    OperationCancelled,
    /// A value exceeded its size limit.
    ValueTooLarge,
    /// A network address literal failed to parse.
    ConnectionStringInvalid,
    /// Serialization or deserialization failed.
    SerializationFailed,
    /// A requested attribute was not present.
    AttributeNotFound,
    /// An attribute exceeded its size limit.
    AttributeTooLarge,
    /// An I/O operation failed.
    IoError,
    /// Catch-all for unclassified failures.
    UnknownError,
}

impl ErrorKind {
    /// Stable, grep-friendly name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BrokenPromise => "broken_promise",
            Self::FutureAlreadySet => "future_already_set",
            Self::ActorCancelled => "actor_cancelled",
            Self::EndOfStream => "end_of_stream",
            Self::OperationCancelled => "operation_cancelled",
            Self::ValueTooLarge => "value_too_large",
            Self::ConnectionStringInvalid => "connection_string_invalid",
            Self::SerializationFailed => "serialization_failed",
            Self::AttributeNotFound => "attribute_not_found",
            Self::AttributeTooLarge => "attribute_too_large",
            Self::IoError => "io_error",
            Self::UnknownError => "unknown_error",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::BrokenPromise => "broken promise",
            Self::FutureAlreadySet => "future already set",
            Self::ActorCancelled => "operation aborted because the actor was cancelled",
            Self::EndOfStream => "end of stream",
            Self::OperationCancelled => "operation cancelled before it could run",
            Self::ValueTooLarge => "value too large",
            Self::ConnectionStringInvalid => "connection string invalid",
            Self::SerializationFailed => "serialization or deserialization failed",
            Self::AttributeNotFound => "attribute not found",
            Self::AttributeTooLarge => "attribute too large",
            Self::IoError => "i/o failure",
            Self::UnknownError => "unknown error",
        }
    }

    /// Stable numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::BrokenPromise => 1100,
            Self::FutureAlreadySet => 1101,
            Self::ActorCancelled => 1102,
            Self::EndOfStream => 1103,
            Self::OperationCancelled => 1104,
            Self::ValueTooLarge => 2103,
            Self::ConnectionStringInvalid => 2105,
            Self::SerializationFailed => 2107,
            Self::AttributeNotFound => 2114,
            Self::AttributeTooLarge => 2115,
            Self::IoError => 1510,
            Self::UnknownError => 4000,
        }
    }
}

/// The error value that travels through cells and suspension points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    injected_fault: bool,
}

impl Error {
    /// Creates an error of the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            injected_fault: false,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Stable name of the kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Human description of the kind.
    #[must_use]
    pub const fn what(&self) -> &'static str {
        self.kind.description()
    }

    /// Stable numeric code of the kind.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.kind.code()
    }

    /// Marks this error as the product of deliberate fault injection.
    ///
    /// The trace pipeline downgrades `SevError` events carrying an injected
    /// fault to `SevWarnAlways` so injected noise cannot mask real bugs.
    #[must_use]
    pub const fn injected(mut self) -> Self {
        self.injected_fault = true;
        self
    }

    /// Returns true if this error was injected by fault testing.
    #[must_use]
    pub const fn is_injected_fault(&self) -> bool {
        self.injected_fault
    }

    /// Returns true if this error signals cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ActorCancelled | ErrorKind::OperationCancelled
        )
    }

    /// Shorthand constructor.
    #[must_use]
    pub const fn broken_promise() -> Self {
        Self::new(ErrorKind::BrokenPromise)
    }

    /// Shorthand constructor.
    #[must_use]
    pub const fn actor_cancelled() -> Self {
        Self::new(ErrorKind::ActorCancelled)
    }

    /// Shorthand constructor.
    #[must_use]
    pub const fn end_of_stream() -> Self {
        Self::new(ErrorKind::EndOfStream)
    }

    /// Shorthand constructor.
    #[must_use]
    pub const fn operation_cancelled() -> Self {
        Self::new(ErrorKind::OperationCancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.what())
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Self::new(ErrorKind::IoError)
    }
}

/// A specialized Result for runtime operations.
pub type Result<T> = core::result::Result<T, Error>;
