use std::fmt::{Display, Formatter};

use crate::database::native::NativeError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseErrorCode {
    InvalidArgument,
    Internal,
    PermissionDenied,
    NativeCall,
    NativeCallback,
    UnsupportedValue,
}

impl DatabaseErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseErrorCode::InvalidArgument => "database/invalid-argument",
            DatabaseErrorCode::Internal => "database/internal",
            DatabaseErrorCode::PermissionDenied => "database/permission-denied",
            DatabaseErrorCode::NativeCall => "database/native-call",
            DatabaseErrorCode::NativeCallback => "database/native-callback",
            DatabaseErrorCode::UnsupportedValue => "database/unsupported-value",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseError {
    pub code: DatabaseErrorCode,
    message: String,
    field: Option<String>,
}

impl DatabaseError {
    pub fn new(code: DatabaseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name of the argument field that failed validation, when known
    /// (e.g. `orderBy.value` or `limit.type`).
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl Display for DatabaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for DatabaseError {}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

pub fn invalid_argument(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::InvalidArgument, message)
}

pub fn invalid_field(field: &str, message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::InvalidArgument, message).with_field(field)
}

pub fn internal_error(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::Internal, message)
}

pub fn permission_denied(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::PermissionDenied, message)
}

pub fn unsupported_value(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::UnsupportedValue, message)
}

/// Wraps an error the native layer raised synchronously while a call was made.
pub fn native_call_error(operation: &str, error: NativeError) -> DatabaseError {
    DatabaseError::new(
        DatabaseErrorCode::NativeCall,
        format!("{operation} failed: {error}"),
    )
}

/// Wraps an error the native layer delivered through a completion or cancel callback.
pub fn native_callback_error(operation: &str, error: NativeError) -> DatabaseError {
    if error.is_permission_denied() {
        return permission_denied(format!("{operation} failed: {error}"));
    }
    DatabaseError::new(
        DatabaseErrorCode::NativeCallback,
        format!("{operation} failed: {error}"),
    )
}
