use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
