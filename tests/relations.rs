mod helpers;

use helpers::{GroupBuilder, RoleBuilder, TestStack, UserBuilder, ORG, PARTNER};
use sea_orm::EntityTrait;
use warden::authz::scope::{ProjectNamespaceRole, SubjectKind};
use warden::authz::types::{Policy, RolePermissionRule, UserGroup};
use warden::authz::{AuthzError, EngineModel};
use warden::entities;
use warden::relations::reconcile::reconcile;
use warden::relations::TenantRef;
use warden::storage;

fn tenant_ref() -> TenantRef {
    TenantRef {
        partner: PARTNER.to_string(),
        organization: ORG.to_string(),
    }
}

fn params(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

async fn group_id(stack: &TestStack, name: &str) -> String {
    storage::find_group(stack.db.connection(), name, &stack.tenant)
        .await
        .unwrap()
        .expect("group exists")
        .id
}

#[tokio::test]
async fn test_group_bound_to_project_role() {
    let stack = TestStack::new().await;
    let db = stack.db.connection();
    RoleBuilder::new("editor").create(db, &stack.tenant).await;

    let group = GroupBuilder::new("g1")
        .with_role("editor", Some("proj1"), None)
        .build();
    let created = stack.relations.create_group(&group).await.expect("create group");
    assert_eq!(
        created.spec.project_namespace_roles,
        vec![ProjectNamespaceRole::new("editor", Some("proj1"), None)]
    );

    let rows = entities::ProjectGroupRole::find().all(db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(entities::GroupRole::find().all(db).await.unwrap().is_empty());

    let policies = stack.gateway.list_policies(&Policy::subject("g:g1")).await;
    assert_eq!(policies, vec![Policy::new("g:g1", "*", "proj1", "acme", "editor")]);

    let allowed = stack
        .gateway
        .enforce(params(&["g:g1", "*", "proj1", "acme", "editor"]))
        .await
        .unwrap();
    assert!(allowed);
}

#[tokio::test]
async fn test_scope_normalization_per_tier() {
    let stack = TestStack::new().await;
    let db = stack.db.connection();
    RoleBuilder::new("editor").create(db, &stack.tenant).await;

    let group = GroupBuilder::new("ops")
        .with_role("editor", None, None)
        .with_role("editor", Some("proj1"), Some(""))
        .with_role("editor", Some("proj1"), Some("team-a"))
        .build();
    stack.relations.create_group(&group).await.expect("create group");

    let mut policies = stack.gateway.list_policies(&Policy::subject("g:ops")).await;
    policies.sort();
    assert_eq!(
        policies,
        vec![
            Policy::new("g:ops", "*", "*", "acme", "editor"),
            Policy::new("g:ops", "*", "proj1", "acme", "editor"),
            Policy::new("g:ops", "team-a", "proj1", "acme", "editor"),
        ]
    );

    assert_eq!(entities::GroupRole::find().all(db).await.unwrap().len(), 1);
    assert_eq!(entities::ProjectGroupRole::find().all(db).await.unwrap().len(), 1);
    assert_eq!(
        entities::ProjectGroupNamespaceRole::find().all(db).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_unknown_role_fails_without_writing() {
    let stack = TestStack::new().await;
    let db = stack.db.connection();
    RoleBuilder::new("editor").create(db, &stack.tenant).await;

    let group = GroupBuilder::new("g1")
        .with_role("editor", None, None)
        .with_role("ghost", None, None)
        .build();
    let err = stack.relations.create_group(&group).await.unwrap_err();
    assert!(matches!(err, AuthzError::NotFound(_)));
    assert!(err.to_string().contains("unable to find role 'ghost'"));

    assert!(storage::find_group(db, "g1", &stack.tenant).await.unwrap().is_none());
    assert!(stack.gateway.list_policies(&Policy::default()).await.is_empty());
}

#[tokio::test]
async fn test_unknown_project_fails_without_writing() {
    let stack = TestStack::new().await;
    RoleBuilder::new("editor").create(stack.db.connection(), &stack.tenant).await;

    let group = GroupBuilder::new("g1")
        .with_role("editor", Some("nope"), None)
        .build();
    let err = stack.relations.create_group(&group).await.unwrap_err();
    assert!(err.to_string().contains("unable to find project 'nope'"));
    assert!(stack.gateway.list_policies(&Policy::default()).await.is_empty());
}

#[tokio::test]
async fn test_namespace_requires_project_and_dns_label() {
    let stack = TestStack::new().await;
    RoleBuilder::new("editor").create(stack.db.connection(), &stack.tenant).await;

    let orphan = GroupBuilder::new("g1")
        .with_role("editor", None, Some("team-a"))
        .build();
    let err = stack.relations.create_group(&orphan).await.unwrap_err();
    assert!(matches!(err, AuthzError::InvalidArgument(_)));

    let bad_label = GroupBuilder::new("g1")
        .with_role("editor", Some("proj1"), Some("Team_A"))
        .build();
    let err = stack.relations.create_group(&bad_label).await.unwrap_err();
    assert!(matches!(err, AuthzError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_duplicate_group_is_a_conflict() {
    let stack = TestStack::new().await;
    let group = GroupBuilder::new("g1").build();
    stack.relations.create_group(&group).await.unwrap();

    let err = stack.relations.create_group(&group).await.unwrap_err();
    assert!(matches!(err, AuthzError::Conflict(_)));
}

#[tokio::test]
async fn test_group_update_replaces_role_set() {
    let stack = TestStack::new().await;
    let db = stack.db.connection();
    RoleBuilder::new("editor").create(db, &stack.tenant).await;
    RoleBuilder::new("viewer").with_scope("organization").create(db, &stack.tenant).await;

    stack
        .relations
        .create_group(&GroupBuilder::new("g1").with_role("editor", Some("proj1"), None).build())
        .await
        .unwrap();
    let updated = stack
        .relations
        .update_group(&GroupBuilder::new("g1").with_role("viewer", None, None).build())
        .await
        .unwrap();

    assert_eq!(
        updated.spec.project_namespace_roles,
        vec![ProjectNamespaceRole::new("viewer", None, None)]
    );
    assert_eq!(
        stack.gateway.list_policies(&Policy::subject("g:g1")).await,
        vec![Policy::new("g:g1", "*", "*", "acme", "viewer")]
    );
    assert!(entities::ProjectGroupRole::find().all(db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_engine_failure_after_commit_leaves_engine_on_old_set() {
    let stack = TestStack::new().await;
    let db = stack.db.connection();
    RoleBuilder::new("editor").create(db, &stack.tenant).await;
    RoleBuilder::new("viewer").with_scope("organization").create(db, &stack.tenant).await;

    stack
        .relations
        .create_group(&GroupBuilder::new("g1").with_role("editor", Some("proj1"), None).build())
        .await
        .unwrap();

    stack.engine.fail_writes(true);
    let err = stack
        .relations
        .update_group(&GroupBuilder::new("g1").with_role("viewer", None, None).build())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::Engine(_)));

    // Relational store holds the new set.
    let id = group_id(&stack, "g1").await;
    let rows = storage::list_subject_roles(db, SubjectKind::Group, &id).await.unwrap();
    assert_eq!(rows, vec![ProjectNamespaceRole::new("viewer", None, None)]);

    // Engine still holds the old set.
    assert_eq!(
        stack.gateway.list_policies(&Policy::subject("g:g1")).await,
        vec![Policy::new("g:g1", "*", "proj1", "acme", "editor")]
    );

    // A pruning reconcile restores agreement.
    stack.engine.fail_writes(false);
    let report = reconcile(db, &stack.gateway, true).await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(
        stack.gateway.list_policies(&Policy::subject("g:g1")).await,
        vec![Policy::new("g:g1", "*", "*", "acme", "viewer")]
    );
}

#[tokio::test]
async fn test_concurrent_updates_of_one_group_end_consistent() {
    let stack = TestStack::new().await;
    let db = stack.db.connection();
    RoleBuilder::new("editor").create(db, &stack.tenant).await;
    RoleBuilder::new("viewer").with_scope("organization").create(db, &stack.tenant).await;
    stack
        .relations
        .create_group(&GroupBuilder::new("g1").build())
        .await
        .unwrap();

    let a = GroupBuilder::new("g1").with_role("editor", Some("proj1"), None).build();
    let b = GroupBuilder::new("g1").with_role("viewer", None, None).build();
    let (ra, rb) = tokio::join!(
        stack.relations.update_group(&a),
        stack.relations.update_group(&b)
    );
    ra.unwrap();
    rb.unwrap();

    let id = group_id(&stack, "g1").await;
    let rows = storage::list_subject_roles(db, SubjectKind::Group, &id).await.unwrap();
    assert_eq!(rows.len(), 1);
    let policies = stack.gateway.list_policies(&Policy::subject("g:g1")).await;
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0].obj, rows[0].role);
}

#[tokio::test]
async fn test_group_delete_clears_tuples_and_rows() {
    let stack = TestStack::new().await;
    let db = stack.db.connection();
    RoleBuilder::new("editor").create(db, &stack.tenant).await;
    stack
        .relations
        .create_user(&UserBuilder::new("alice").build())
        .await
        .unwrap();
    stack
        .relations
        .create_group(
            &GroupBuilder::new("g1")
                .with_user("alice")
                .with_role("editor", Some("proj1"), None)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(
        stack.gateway.list_user_groups(&UserGroup::default()).await,
        vec![UserGroup::new("u:alice", "g:g1")]
    );

    stack.relations.delete_group("g1", &tenant_ref()).await.unwrap();

    assert!(stack.gateway.list_policies(&Policy::default()).await.is_empty());
    assert!(stack.gateway.list_user_groups(&UserGroup::default()).await.is_empty());
    assert!(entities::GroupAccount::find().all(db).await.unwrap().is_empty());
    let err = stack.relations.get_group("g1", &tenant_ref()).await.unwrap_err();
    assert!(matches!(err, AuthzError::NotFound(_)));
}

#[tokio::test]
async fn test_user_inherits_group_roles() {
    let stack = TestStack::new().await;
    RoleBuilder::new("editor").create(stack.db.connection(), &stack.tenant).await;
    stack
        .relations
        .create_group(&GroupBuilder::new("g1").with_role("editor", Some("proj1"), None).build())
        .await
        .unwrap();

    let user = stack
        .relations
        .create_user(&UserBuilder::new("alice").in_group("g1").build())
        .await
        .unwrap();
    assert_eq!(user.spec.groups, vec!["g1".to_string()]);
    assert_eq!(stack.identity.len(), 1);

    let allowed = stack
        .gateway
        .enforce(params(&["u:alice", "team-a", "proj1", "acme", "editor"]))
        .await
        .unwrap();
    assert!(allowed);
}

#[tokio::test]
async fn test_user_direct_namespace_role() {
    let stack = TestStack::new().await;
    RoleBuilder::new("editor").create(stack.db.connection(), &stack.tenant).await;

    stack
        .relations
        .create_user(
            &UserBuilder::new("bob")
                .with_role("editor", Some("proj1"), Some("team-a"))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(
        stack.gateway.list_policies(&Policy::subject("u:bob")).await,
        vec![Policy::new("u:bob", "team-a", "proj1", "acme", "editor")]
    );
    let rows = entities::ProjectAccountNamespaceRole::find()
        .all(stack.db.connection())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!stack
        .gateway
        .enforce(params(&["u:bob", "team-b", "proj1", "acme", "editor"]))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_user_with_unknown_group_creates_nothing() {
    let stack = TestStack::new().await;
    let err = stack
        .relations
        .create_user(&UserBuilder::new("alice").in_group("missing").build())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unable to find group 'missing'"));
    assert!(stack.identity.is_empty());
    assert!(storage::find_account_by_username(stack.db.connection(), "alice")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_user_update_and_delete() {
    let stack = TestStack::new().await;
    RoleBuilder::new("editor").create(stack.db.connection(), &stack.tenant).await;
    stack
        .relations
        .create_group(&GroupBuilder::new("g1").build())
        .await
        .unwrap();
    stack
        .relations
        .create_user(&UserBuilder::new("alice").in_group("g1").build())
        .await
        .unwrap();

    let updated = stack
        .relations
        .update_user(&UserBuilder::new("alice").with_role("editor", None, None).build())
        .await
        .unwrap();
    assert!(updated.spec.groups.is_empty());
    assert!(stack.gateway.list_user_groups(&UserGroup::default()).await.is_empty());
    assert_eq!(
        stack.gateway.list_policies(&Policy::subject("u:alice")).await,
        vec![Policy::new("u:alice", "*", "*", "acme", "editor")]
    );

    stack.relations.delete_user("alice", &tenant_ref()).await.unwrap();
    assert!(stack.gateway.list_policies(&Policy::default()).await.is_empty());
    assert!(stack.identity.is_empty());
    assert!(matches!(
        stack.relations.get_user("alice", &tenant_ref()).await.unwrap_err(),
        AuthzError::NotFound(_)
    ));

    // Username is free again after a delete.
    stack
        .relations
        .create_user(&UserBuilder::new("alice").build())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_role_create_commits_endpoint_bindings() {
    let stack = TestStack::new().await;
    let role = RoleBuilder::new("viewer")
        .with_scope("Organization")
        .with_permission("cluster.read")
        .spec();

    let created = stack.relations.create_role(&role).await.unwrap();
    assert_eq!(created.spec.scope, "organization");
    assert_eq!(created.spec.rolepermissions, vec!["cluster.read".to_string()]);

    assert_eq!(
        stack.gateway.list_role_permission_rules("viewer").await,
        vec![RolePermissionRule::new("/api/v1/clusters", "viewer", "GET")]
    );
}

#[tokio::test]
async fn test_role_update_replaces_bindings() {
    let stack = TestStack::new().await;
    stack
        .relations
        .create_role(&RoleBuilder::new("operator").with_permission("cluster.read").spec())
        .await
        .unwrap();

    let updated = stack
        .relations
        .update_role(&RoleBuilder::new("operator").with_permission("cluster.write").spec())
        .await
        .unwrap();
    assert_eq!(updated.spec.rolepermissions, vec!["cluster.write".to_string()]);
    assert_eq!(
        stack.gateway.list_role_permission_rules("operator").await,
        vec![RolePermissionRule::new("/api/v1/clusters", "operator", "POST")]
    );

    stack.relations.delete_role("operator", &tenant_ref()).await.unwrap();
    assert!(stack.gateway.list_role_permission_rules("operator").await.is_empty());
    assert!(stack.relations.list_roles(&tenant_ref()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_role_with_unknown_permission_is_rejected() {
    let stack = TestStack::new().await;
    let err = stack
        .relations
        .create_role(&RoleBuilder::new("viewer").with_permission("nope").spec())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::InvalidArgument(_)));
    assert!(err.to_string().contains("unable to find role permission 'nope'"));
    assert!(stack.relations.list_roles(&tenant_ref()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_role_with_unknown_scope_is_rejected() {
    let stack = TestStack::new().await;
    let err = stack
        .relations
        .create_role(&RoleBuilder::new("viewer").with_scope("cluster").spec())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_builtin_role_is_protected() {
    let stack = TestStack::new().await;
    RoleBuilder::new("ADMIN")
        .with_scope("system")
        .global()
        .builtin()
        .create(stack.db.connection(), &stack.tenant)
        .await;

    let err = stack
        .relations
        .update_role(&RoleBuilder::new("ADMIN").with_scope("system").spec())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::Conflict(_)));

    let err = stack.relations.delete_role("ADMIN", &tenant_ref()).await.unwrap_err();
    assert!(matches!(err, AuthzError::Conflict(_)));
}

#[tokio::test]
async fn test_same_role_name_in_two_organizations_binds_the_union() {
    let stack = TestStack::with_model(EngineModel::UrlAction).await;
    storage::create_organization(stack.db.connection(), "beta", &stack.tenant.partner_id)
        .await
        .unwrap();
    let beta = TenantRef {
        partner: PARTNER.to_string(),
        organization: "beta".to_string(),
    };
    let beta_role = |builder: RoleBuilder| {
        let mut role = builder.with_scope("organization").spec();
        role.metadata.organization = "beta".to_string();
        role
    };
    let get = RolePermissionRule::new("/api/v1/clusters", "viewer", "GET");
    let post = RolePermissionRule::new("/api/v1/clusters", "viewer", "POST");
    let gateway = &stack.gateway;
    let bound = || async move {
        let mut rules = gateway.list_role_permission_rules("viewer").await;
        rules.sort();
        rules
    };

    stack
        .relations
        .create_role(
            &RoleBuilder::new("viewer")
                .with_scope("organization")
                .with_permission("cluster.read")
                .spec(),
        )
        .await
        .unwrap();

    let created = stack
        .relations
        .create_role(&beta_role(
            RoleBuilder::new("viewer")
                .with_permission("cluster.read")
                .with_permission("cluster.write"),
        ))
        .await
        .expect("overlapping role in a second organization");
    assert_eq!(
        created.spec.rolepermissions,
        vec!["cluster.read".to_string(), "cluster.write".to_string()]
    );
    assert_eq!(bound().await, vec![get.clone(), post.clone()]);

    // Narrowing beta's viewer keeps acme's read binding
    stack
        .relations
        .update_role(&beta_role(RoleBuilder::new("viewer").with_permission("cluster.write")))
        .await
        .unwrap();
    assert_eq!(bound().await, vec![get.clone(), post.clone()]);

    stack.relations.delete_role("viewer", &beta).await.unwrap();
    assert_eq!(bound().await, vec![get]);
    assert_eq!(
        stack
            .relations
            .get_role("viewer", &tenant_ref())
            .await
            .unwrap()
            .spec
            .rolepermissions,
        vec!["cluster.read".to_string()]
    );
}
