use serde::Serialize;

/// Broad failure classes. Each maps to one process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input from the user: arguments, files, unknown profiles.
    Usage,
    /// The remote rejected the API key.
    Auth,
    /// The remote could not be reached or answered with an error.
    Sync,
    /// Local state database failures.
    Store,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Usage = 2,
    Auth = 3,
    Sync = 4,
    Store = 5,
    Io = 6,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<ErrorKind> for ExitCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Usage => ExitCode::Usage,
            ErrorKind::Auth => ExitCode::Auth,
            ErrorKind::Sync => ExitCode::Sync,
            ErrorKind::Store => ExitCode::Store,
            ErrorKind::Io => ExitCode::Io,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{message}")]
pub struct ContactsError {
    pub kind: ErrorKind,
    pub message: String,
    /// Set when the error came from a non-2xx remote answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl ContactsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    pub fn sync(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Sync, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    /// Non-2xx answer from the remote. The message is kept free of status
    /// decorations so it can be shown to the user as-is.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ErrorKind::Auth,
            _ => ErrorKind::Sync,
        };

        Self {
            http_status: Some(status),
            ..Self::new(kind, message)
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        self.kind.into()
    }
}

impl From<std::io::Error> for ContactsError {
    fn from(value: std::io::Error) -> Self {
        Self::io(value.to_string())
    }
}

pub type ContactsResult<T> = Result<T, ContactsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_errors_split_auth_from_sync() {
        let unauthorized = ContactsError::http(401, "invalid token");
        assert_eq!(unauthorized.kind, ErrorKind::Auth);
        assert_eq!(unauthorized.exit_code(), ExitCode::Auth);
        assert_eq!(unauthorized.http_status, Some(401));

        let forbidden = ContactsError::http(403, "key revoked");
        assert_eq!(forbidden.kind, ErrorKind::Auth);

        let unavailable = ContactsError::http(503, "maintenance");
        assert_eq!(unavailable.kind, ErrorKind::Sync);
        assert_eq!(unavailable.to_string(), "maintenance");
    }

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ContactsError::usage("x").exit_code().as_i32(), 2);
        assert_eq!(ContactsError::sync("x").exit_code().as_i32(), 4);
        assert_eq!(ContactsError::store("x").exit_code().as_i32(), 5);
        assert_eq!(ContactsError::io("x").exit_code().as_i32(), 6);
    }

    #[test]
    fn serializes_kind_in_snake_case() {
        let value = serde_json::to_value(ContactsError::store("disk full")).expect("encode");
        assert_eq!(value["kind"], "store");
        assert_eq!(value["message"], "disk full");
        assert!(value.get("http_status").is_none());
    }
}
