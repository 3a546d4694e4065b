//! Conversions from external infrastructure errors into domain errors.

use calbridge_domain::CalBridgeError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CalBridgeError);

impl From<InfraError> for CalBridgeError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CalBridgeError> for InfraError {
    fn from(value: CalBridgeError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoDomainError {
    fn into_domain(self) -> CalBridgeError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CalBridgeError */
/* -------------------------------------------------------------------------- */

impl IntoDomainError for SqlError {
    fn into_domain(self) -> CalBridgeError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        CalBridgeError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CalBridgeError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        CalBridgeError::Conflict("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, _) => {
                        CalBridgeError::Database(format!("constraint violation: {message}"))
                    }
                    _ => CalBridgeError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => {
                CalBridgeError::NotFound("no rows returned by query".into())
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                CalBridgeError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                CalBridgeError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                CalBridgeError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidParameterName(parameter_name) => {
                CalBridgeError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => CalBridgeError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => CalBridgeError::Database("invalid SQL query".into()),
            other => CalBridgeError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_domain())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CalBridgeError */
/* -------------------------------------------------------------------------- */

impl IntoDomainError for HttpError {
    fn into_domain(self) -> CalBridgeError {
        if self.is_timeout() {
            return CalBridgeError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return CalBridgeError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => CalBridgeError::Auth(message),
                404 => CalBridgeError::NotFound(message),
                429 => CalBridgeError::Network(message),
                400..=499 => CalBridgeError::InvalidInput(message),
                500..=599 => CalBridgeError::Network(message),
                _ => CalBridgeError::Network(message),
            };
        }

        CalBridgeError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_domain())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
