use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(warden::authz::invalid_argument),
        help("Policy tuples need five non-empty fields; use \"*\" for a wildcard, never a blank")
    )]
    InvalidArgument(String),

    #[error("{0}")]
    #[diagnostic(code(warden::authz::not_found))]
    NotFound(String),

    #[error("{0}")]
    #[diagnostic(code(warden::authz::conflict))]
    Conflict(String),

    #[error("Policy engine error: {0}")]
    #[diagnostic(
        code(warden::authz::engine),
        help("The relational store may now be ahead of the live rule set; a reconcile run restores agreement")
    )]
    Engine(String),

    #[error("Identity provider error: {0}")]
    #[diagnostic(code(warden::authz::identity))]
    Identity(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(warden::authz::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Malformed permission record: {0}")]
    #[diagnostic(code(warden::authz::serde))]
    Serde(#[from] serde_json::Error),
}

impl From<casbin::Error> for AuthzError {
    fn from(value: casbin::Error) -> Self {
        AuthzError::Engine(value.to_string())
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthzError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AuthzError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthzError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
