use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArborError {
    #[error("configuration error: {message}")]
    Config { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("format error: {message}")]
    Format { message: String },
    #[error("schema error: {message}")]
    Schema { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl ArborError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

pub type ArborResult<T> = Result<T, ArborError>;

impl From<sea_orm::DbErr> for ArborError {
    fn from(value: sea_orm::DbErr) -> Self {
        ArborError::storage(value.to_string())
    }
}
