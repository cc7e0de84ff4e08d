use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::authz::service::EnforcementGateway;
use crate::authz::types::{
    BoolReply, EnforceRequest, EnforceResponse, Policies, Policy, RoleFilter,
    RolePermissionMappingList, UserGroup, UserGroups,
};

pub fn router(gateway: Arc<EnforcementGateway>) -> Router {
    Router::new()
        .route("/v1/authz/enforce", post(handle_enforce))
        .route(
            "/v1/authz/policies",
            get(list_policies).post(create_policies).delete(delete_policies),
        )
        .route(
            "/v1/authz/user-groups",
            get(list_user_groups)
                .post(create_user_groups)
                .delete(delete_user_groups),
        )
        .route(
            "/v1/authz/role-permission-mappings",
            get(list_role_permission_mappings)
                .post(create_role_permission_mappings)
                .delete(delete_role_permission_mappings),
        )
        .route("/healthz", get(health))
        .with_state(gateway)
}

async fn handle_enforce(
    State(gateway): State<Arc<EnforcementGateway>>,
    Json(req): Json<EnforceRequest>,
) -> impl IntoResponse {
    match gateway.enforce(req.params).await {
        Ok(allowed) => Json(EnforceResponse { allowed }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_policies(
    State(gateway): State<Arc<EnforcementGateway>>,
    Query(filter): Query<Policy>,
) -> impl IntoResponse {
    let policies = gateway.list_policies(&filter).await;
    Json(Policies { policies })
}

async fn create_policies(
    State(gateway): State<Arc<EnforcementGateway>>,
    Json(req): Json<Policies>,
) -> impl IntoResponse {
    match gateway.create_policies(&req.policies).await {
        Ok(result) => Json(BoolReply { result }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_policies(
    State(gateway): State<Arc<EnforcementGateway>>,
    Query(filter): Query<Policy>,
) -> impl IntoResponse {
    match gateway.delete_policies(&filter).await {
        Ok(result) => Json(BoolReply { result }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_user_groups(
    State(gateway): State<Arc<EnforcementGateway>>,
    Query(filter): Query<UserGroup>,
) -> impl IntoResponse {
    let user_groups = gateway.list_user_groups(&filter).await;
    Json(UserGroups { user_groups })
}

async fn create_user_groups(
    State(gateway): State<Arc<EnforcementGateway>>,
    Json(req): Json<UserGroups>,
) -> impl IntoResponse {
    match gateway.create_user_groups(&req.user_groups).await {
        Ok(result) => Json(BoolReply { result }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_user_groups(
    State(gateway): State<Arc<EnforcementGateway>>,
    Query(filter): Query<UserGroup>,
) -> impl IntoResponse {
    match gateway.delete_user_groups(&filter).await {
        Ok(result) => Json(BoolReply { result }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_role_permission_mappings(
    State(gateway): State<Arc<EnforcementGateway>>,
    Query(filter): Query<RoleFilter>,
) -> impl IntoResponse {
    match gateway.list_role_permission_mappings(&filter.role).await {
        Ok(mappings) => Json(RolePermissionMappingList { mappings }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_role_permission_mappings(
    State(gateway): State<Arc<EnforcementGateway>>,
    Json(req): Json<RolePermissionMappingList>,
) -> impl IntoResponse {
    match gateway.create_role_permission_mappings(&req.mappings).await {
        Ok(result) => Json(BoolReply { result }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_role_permission_mappings(
    State(gateway): State<Arc<EnforcementGateway>>,
    Query(filter): Query<RoleFilter>,
) -> impl IntoResponse {
    match gateway.delete_role_permission_mappings(&filter.role).await {
        Ok(result) => Json(BoolReply { result }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
