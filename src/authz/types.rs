use serde::{Deserialize, Serialize};

/// Wildcard token for a policy field. An empty field is invalid, never a wildcard.
pub const WILDCARD: &str = "*";

/// Five-field evaluation rule: subject holds role `obj` in (ns, proj, org).
///
/// Also doubles as a filter, where an empty field matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub sub: String,
    pub ns: String,
    pub proj: String,
    pub org: String,
    pub obj: String,
}

impl Policy {
    pub fn new(sub: &str, ns: &str, proj: &str, org: &str, obj: &str) -> Self {
        Self {
            sub: sub.to_string(),
            ns: ns.to_string(),
            proj: proj.to_string(),
            org: org.to_string(),
            obj: obj.to_string(),
        }
    }

    pub fn subject(sub: &str) -> Self {
        Self {
            sub: sub.to_string(),
            ..Default::default()
        }
    }

    pub fn fields(&self) -> [&str; 5] {
        [&self.sub, &self.ns, &self.proj, &self.org, &self.obj]
    }
}

/// Membership of a user subject (`u:<name>`) in a group subject (`g:<name>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct UserGroup {
    pub user: String,
    pub grp: String,
}

impl UserGroup {
    pub fn new(user: &str, grp: &str) -> Self {
        Self {
            user: user.to_string(),
            grp: grp.to_string(),
        }
    }
}

/// Logical grant of permission names to a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolePermissionMapping {
    pub role: String,
    pub permission: Vec<String>,
}

/// One concrete role-grouping tuple: `role` may call `method` on `url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RolePermissionRule {
    pub url: String,
    pub role: String,
    pub method: String,
}

impl RolePermissionRule {
    pub fn new(url: &str, role: &str, method: &str) -> Self {
        Self {
            url: url.to_string(),
            role: role.to_string(),
            method: method.to_string(),
        }
    }
}

/// `{url, methods}` entry of a permission record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUrl {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Permission definition as persisted or loaded from a seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub resource_urls: Vec<ResourceUrl>,
    #[serde(default)]
    pub resource_action_urls: Vec<ResourceUrl>,
}

// Wire types for the gateway surface

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnforceRequest {
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforceResponse {
    pub allowed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoolReply {
    pub result: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policies {
    #[serde(default)]
    pub policies: Vec<Policy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroups {
    #[serde(default)]
    pub user_groups: Vec<UserGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolePermissionMappingList {
    #[serde(default)]
    pub mappings: Vec<RolePermissionMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleFilter {
    pub role: String,
}
