use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Connectivity, TLS, DNS, or timeout failure. Safe to retry.
    Transport,
    /// Credential rejected or insufficient. Retrying needs a new credential.
    Authorization,
    /// Malformed or unexpected response, or a server-reported fault.
    Protocol,
    /// The client could not be constructed; no usable client exists.
    Construction,
    Usage,
    Io,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transport)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    method: Option<String>,
    code: Option<i64>,
    name: Option<String>,
    trace: Option<String>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            method: None,
            code: None,
            name: None,
            trace: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Remote procedure the failing call targeted.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// JSON-RPC error code reported by the server.
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    /// Error class name reported by the server (e.g. `JSONRPCError`).
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Server-side trace text, when the server sends one.
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Kind of the wrapped error when the direct source is itself an `Error`.
    /// Construction failures use this to tell a rejected credential
    /// (`Authorization`) from an unreachable auth service (`Transport`).
    pub fn cause_kind(&self) -> Option<ErrorKind> {
        self.source
            .as_ref()
            .and_then(|source| source.downcast_ref::<Error>())
            .map(Error::kind)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(code) = self.code {
            write!(f, " (code: {code})")?;
        }
        if let Some(method) = &self.method {
            write!(f, " (method: {method})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Usage => 2,
        ErrorKind::Transport => 3,
        ErrorKind::Authorization => 4,
        ErrorKind::Protocol => 5,
        ErrorKind::Construction => 6,
        ErrorKind::Io => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_exit_code};
    use std::error::Error as _;

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Usage, 2),
            (ErrorKind::Transport, 3),
            (ErrorKind::Authorization, 4),
            (ErrorKind::Protocol, 5),
            (ErrorKind::Construction, 6),
            (ErrorKind::Io, 8),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(ErrorKind::Transport.is_retryable());
        assert!(!ErrorKind::Authorization.is_retryable());
        assert!(!ErrorKind::Protocol.is_retryable());
        assert!(!ErrorKind::Construction.is_retryable());
    }

    #[test]
    fn display_includes_remote_details() {
        let err = Error::new(ErrorKind::Protocol)
            .with_message("method not found")
            .with_code(-32601)
            .with_method("svc.get_widget");
        assert_eq!(
            err.to_string(),
            "Protocol: method not found (code: -32601) (method: svc.get_widget)"
        );
    }

    #[test]
    fn source_chain_is_preserved() {
        let io = std::io::Error::other("boom");
        let err = Error::new(ErrorKind::Io).with_source(io);
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
        assert_eq!(err.cause_kind(), None);
    }

    #[test]
    fn cause_kind_reads_nested_error() {
        let inner = Error::new(ErrorKind::Authorization).with_message("token rejected");
        let err = Error::new(ErrorKind::Construction).with_source(inner);
        assert_eq!(err.cause_kind(), Some(ErrorKind::Authorization));
    }
}
