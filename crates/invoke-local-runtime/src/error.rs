//! Error types for handler invocation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for invocation operations.
pub type Result<T> = std::result::Result<T, InvokeError>;

/// Coarse failure category, one per stage of the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Event could not be read or parsed.
    Input,
    /// Artifact missing, not loadable, or lacking the named type.
    Load,
    /// Module instantiation or the type's constructor failed.
    Instantiation,
    /// Method selection, signature check, or the handler itself failed.
    Dispatch,
    /// The result could not be written out.
    Output,
}

impl ErrorKind {
    /// Process exit code reported for this kind of failure.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Input => 2,
            ErrorKind::Load => 3,
            ErrorKind::Instantiation => 4,
            ErrorKind::Dispatch => 5,
            ErrorKind::Output => 6,
        }
    }
}

/// Errors that can occur while invoking a handler.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Failed to read the event source.
    #[error("failed to read event input: {0}")]
    ReadInput(#[source] std::io::Error),

    /// Failed to read an event file.
    #[error("failed to read event file '{path}': {source}")]
    ReadEventFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Event text is not a JSON object.
    #[error("failed to parse event JSON: {0}")]
    ParseEvent(#[source] serde_json::Error),

    /// Failed to serialize the handler input envelope.
    #[error("failed to serialize handler input: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Wasmtime engine or WASI linker could not be set up.
    #[error("failed to set up WASM host: {0}")]
    Host(String),

    /// Artifact path does not exist.
    #[error("artifact not found: {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    /// Artifact exists but is not a loadable module.
    #[error("artifact '{}' is not a loadable module: {message}", path.display())]
    ArtifactInvalid { path: PathBuf, message: String },

    /// No exports declared under the requested type name.
    #[error("type '{type_name}' not found in artifact '{}'", path.display())]
    TypeNotFound { type_name: String, path: PathBuf },

    /// Module instantiation failed (unresolved imports, start trap, ...).
    #[error("failed to instantiate '{type_name}': {message}")]
    Instantiation { type_name: String, message: String },

    /// `<init>` export exists but is not `() -> ()`.
    #[error("type '{type_name}' has no accessible default constructor")]
    NoDefaultConstructor { type_name: String },

    /// Constructor trapped or exited non-zero.
    #[error("constructor of '{type_name}' failed: {message}")]
    ConstructorFailed { type_name: String, message: String },

    /// Positional selection past the end of the declared methods.
    #[error("method index {index} out of bounds for '{type_name}' ({count} declared methods)")]
    MethodIndexOutOfRange {
        type_name: String,
        index: usize,
        count: usize,
    },

    /// Named selection found no such method.
    #[error("type '{type_name}' declares no method '{method}'")]
    MethodNotFound { type_name: String, method: String },

    /// Sole selection found zero or several methods.
    #[error("type '{type_name}' must declare exactly one method, found {count}")]
    AmbiguousMethod { type_name: String, count: usize },

    /// Selected export does not accept the handler calling convention.
    #[error("method '{method}' has signature {signature}, expected () -> ()")]
    SignatureMismatch { method: String, signature: String },

    /// Handler trapped.
    #[error("handler '{method}' failed: {message}")]
    HandlerFailed { method: String, message: String },

    /// Handler called `proc_exit` with a non-zero code.
    #[error("handler '{method}' exited with code {code}")]
    HandlerExited { method: String, code: i32 },

    /// Writing the result to stdout failed.
    #[error("failed to write result: {0}")]
    WriteOutput(#[source] std::io::Error),
}

impl InvokeError {
    /// The stage this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvokeError::ReadInput(_)
            | InvokeError::ReadEventFile { .. }
            | InvokeError::ParseEvent(_) => ErrorKind::Input,
            InvokeError::Host(_)
            | InvokeError::ArtifactNotFound { .. }
            | InvokeError::ArtifactInvalid { .. }
            | InvokeError::TypeNotFound { .. } => ErrorKind::Load,
            InvokeError::Instantiation { .. }
            | InvokeError::NoDefaultConstructor { .. }
            | InvokeError::ConstructorFailed { .. } => ErrorKind::Instantiation,
            InvokeError::Serialize(_)
            | InvokeError::MethodIndexOutOfRange { .. }
            | InvokeError::MethodNotFound { .. }
            | InvokeError::AmbiguousMethod { .. }
            | InvokeError::SignatureMismatch { .. }
            | InvokeError::HandlerFailed { .. }
            | InvokeError::HandlerExited { .. } => ErrorKind::Dispatch,
            InvokeError::WriteOutput(_) => ErrorKind::Output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            ErrorKind::Input.exit_code(),
            ErrorKind::Load.exit_code(),
            ErrorKind::Instantiation.exit_code(),
            ErrorKind::Dispatch.exit_code(),
            ErrorKind::Output.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_kind_classification() {
        let err = InvokeError::ArtifactNotFound {
            path: PathBuf::from("missing.wasm"),
        };
        assert_eq!(err.kind(), ErrorKind::Load);

        let err = InvokeError::MethodIndexOutOfRange {
            type_name: "Handler".into(),
            index: 1,
            count: 1,
        };
        assert_eq!(err.kind(), ErrorKind::Dispatch);
        assert!(err.to_string().contains("out of bounds"));

        let err = InvokeError::ConstructorFailed {
            type_name: "Handler".into(),
            message: "trap".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Instantiation);

        let err = InvokeError::WriteOutput(std::io::Error::other("disk full"));
        assert_eq!(err.kind(), ErrorKind::Output);
        assert_eq!(err.kind().exit_code(), 6);
    }
}
