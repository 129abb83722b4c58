//! Error types reported by the interpreter.
//!
//! Errors never unwind past the statement that produced them: the shell
//! prints the message, logs it and stores [`BatchError::errorlevel`] as the
//! new errorlevel, then carries on with the next statement.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`BatchError`].
pub type Result<T> = std::result::Result<T, BatchError>;

#[derive(Error, Debug)]
pub enum BatchError {
    /// Malformed statement: missing `in`/`do`, bad qualifier, bad `/F` options,
    /// non-numeric `errorlevel` operand.
    #[error("The syntax of the command is incorrect.")]
    Syntax,

    /// A `FOR /F` source (file or captured command output) could not be opened.
    #[error("The system cannot find the file {}.", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `GOTO` or `CALL` to a label that does not exist in the script.
    #[error("The system cannot find the batch label specified - {0}")]
    NoLabel(String),

    /// `CALL :label` from the command line.
    #[error("Invalid attempt to call batch label outside of batch script.")]
    LabelOutsideBatch,

    #[error("'{0}' is not recognized as an internal or external command, operable program or batch file.")]
    NotRecognized(String),

    #[error("The system cannot find the path specified.")]
    PathNotFound,

    /// Nested `CALL`s exceeded `settings.max_call_depth`.
    #[error("Batch recursion exceeds stack limits ({0} levels).")]
    CallDepth(usize),

    #[error("The directory stack is empty.")]
    DirStackEmpty,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl BatchError {
    /// The errorlevel a reported error leaves behind.
    pub fn errorlevel(&self) -> i32 {
        match self {
            BatchError::NotRecognized(_) => 9009,
            _ => 1,
        }
    }
}
