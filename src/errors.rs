use miette::Diagnostic;
use thiserror::Error;

use crate::authz::errors::AuthzError;

#[derive(Debug, Error, Diagnostic)]
pub enum WardenError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(warden::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(warden::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(warden::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(warden::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authz(#[from] AuthzError),

    #[error("Unknown job name: {0}")]
    #[diagnostic(code(warden::unknown_job))]
    UnknownJob(String),

    #[error("{0}")]
    #[diagnostic(code(warden::other))]
    Other(String),
}
