//! HTTP surface: the authorization RPC endpoints from [`crate::authz::web`]
//! plus management endpoints for groups, roles and users.
use crate::authz::errors::AuthzError;
use crate::errors::WardenError;
use crate::jobs;
use crate::relations::{Group, RelationManager, Role, TenantRef, User};
use crate::settings::Settings;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub relations: Arc<RelationManager>,
}

// Response headers for a JSON-only API
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

/// Full application router, without binding a listener.
pub fn app(state: AppState) -> Router {
    let management = Router::new()
        .route("/v1/groups", get(list_groups).post(create_group))
        .route(
            "/v1/groups/{name}",
            get(get_group).put(update_group).delete(delete_group),
        )
        .route("/v1/roles", get(list_roles).post(create_role))
        .route(
            "/v1/roles/{name}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/v1/users", post(create_user))
        .route(
            "/v1/users/{name}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/v1/jobs/{job}/trigger", post(trigger_job))
        .with_state(state.clone());

    crate::authz::web::router(state.relations.authz().clone())
        .merge(management)
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(settings: Settings, relations: Arc<RelationManager>) -> miette::Result<()> {
    let state = AppState {
        settings: Arc::new(settings),
        relations,
    };

    let addr: SocketAddr = state
        .settings
        .bind_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let router = app(state);

    tracing::info!(%addr, "Warden API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}

fn path_matches(path_name: &str, body_name: &str) -> Result<(), AuthzError> {
    if path_name != body_name {
        return Err(AuthzError::InvalidArgument(format!(
            "path name '{path_name}' does not match metadata name '{body_name}'"
        )));
    }
    Ok(())
}

// Groups

async fn list_groups(
    State(state): State<AppState>,
    Query(tenant): Query<TenantRef>,
) -> Result<Json<Vec<Group>>, AuthzError> {
    Ok(Json(state.relations.list_groups(&tenant).await?))
}

async fn create_group(
    State(state): State<AppState>,
    Json(group): Json<Group>,
) -> Result<impl IntoResponse, AuthzError> {
    let created = state.relations.create_group(&group).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(tenant): Query<TenantRef>,
) -> Result<Json<Group>, AuthzError> {
    Ok(Json(state.relations.get_group(&name, &tenant).await?))
}

async fn update_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(group): Json<Group>,
) -> Result<Json<Group>, AuthzError> {
    path_matches(&name, &group.metadata.name)?;
    Ok(Json(state.relations.update_group(&group).await?))
}

async fn delete_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(tenant): Query<TenantRef>,
) -> Result<StatusCode, AuthzError> {
    state.relations.delete_group(&name, &tenant).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Roles

async fn list_roles(
    State(state): State<AppState>,
    Query(tenant): Query<TenantRef>,
) -> Result<Json<Vec<Role>>, AuthzError> {
    Ok(Json(state.relations.list_roles(&tenant).await?))
}

async fn create_role(
    State(state): State<AppState>,
    Json(role): Json<Role>,
) -> Result<impl IntoResponse, AuthzError> {
    let created = state.relations.create_role(&role).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(tenant): Query<TenantRef>,
) -> Result<Json<Role>, AuthzError> {
    Ok(Json(state.relations.get_role(&name, &tenant).await?))
}

async fn update_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(role): Json<Role>,
) -> Result<Json<Role>, AuthzError> {
    path_matches(&name, &role.metadata.name)?;
    Ok(Json(state.relations.update_role(&role).await?))
}

async fn delete_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(tenant): Query<TenantRef>,
) -> Result<StatusCode, AuthzError> {
    state.relations.delete_role(&name, &tenant).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Users

async fn create_user(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> Result<impl IntoResponse, AuthzError> {
    let created = state.relations.create_user(&user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(tenant): Query<TenantRef>,
) -> Result<Json<User>, AuthzError> {
    Ok(Json(state.relations.get_user(&name, &tenant).await?))
}

async fn update_user(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(user): Json<User>,
) -> Result<Json<User>, AuthzError> {
    path_matches(&name, &user.metadata.name)?;
    Ok(Json(state.relations.update_user(&user).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(tenant): Query<TenantRef>,
) -> Result<StatusCode, AuthzError> {
    state.relations.delete_user(&name, &tenant).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Jobs

async fn trigger_job(
    State(state): State<AppState>,
    Path(job): Path<String>,
) -> impl IntoResponse {
    let prune = state.settings.reconcile.prune;
    match jobs::trigger_job_manually(
        state.relations.db(),
        state.relations.authz(),
        &job,
        prune,
    )
    .await
    {
        Ok(Some(report)) => Json(json!({ "job": job, "success": true, "report": report }))
            .into_response(),
        Ok(None) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "job": job, "success": false })),
        )
            .into_response(),
        Err(e) => {
            let status = job_error_status(&e);
            if status.is_server_error() {
                tracing::error!(job = %job, error = %e, "Job trigger failed");
            }
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

fn job_error_status(err: &WardenError) -> StatusCode {
    match err {
        WardenError::UnknownJob(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
