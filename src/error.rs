use thiserror::Error;

/// Errors that can occur while reading, analyzing, or evaluating Scheme code.
///
/// Everything here is recoverable by the caller (the REPL keeps going, the
/// file runner stops) except `OutOfMemory`, which means the heap is still
/// full after a collection and cannot grow further.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemeError {
    /// A variable reference that could not be resolved, either statically or
    /// because its definition never ran.
    #[error("unresolved variable reference: {0}")]
    UnresolvedVariable(String),

    /// A special form with the wrong shape, e.g. `(if x)` or `(quote a b)`.
    #[error("malformed {form} form: {message}")]
    MalformedForm {
        form: &'static str,
        message: String,
    },

    /// Attempted to apply a value that is neither a procedure nor a primitive.
    #[error("not a procedure: {0}")]
    NotAProcedure(String),

    /// A call with an argument count the callee does not accept.
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArgumentCount { expected: String, got: usize },

    /// A primitive was handed a value of the wrong kind.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// The reader hit invalid syntax.
    #[error("read error: {0}")]
    Read(String),

    /// An I/O failure while loading a source file.
    #[error("i/o error: {0}")]
    Io(String),

    /// An arena is full after a full collection and cannot grow. Fatal.
    #[error("heap exhausted: no space left after collection")]
    OutOfMemory,
}

pub type SchemeResult<T> = Result<T, SchemeError>;
