//! Relation-tuple vocabulary and request types.
//!
//! The vocabulary is frozen: extending it means extending these constants,
//! never inventing strings at call sites.

use serde::{Deserialize, Serialize};

// Object types.
pub const PLATFORM_TYPE: &str = "platform";
pub const DOMAIN_TYPE: &str = "domain";
pub const GROUP_TYPE: &str = "group";
pub const THING_TYPE: &str = "thing";
pub const USER_TYPE: &str = "user";

// Subject kinds.
pub const TOKEN_KIND: &str = "token";
pub const USERS_KIND: &str = "users";
pub const THINGS_KIND: &str = "things";
pub const GROUPS_KIND: &str = "groups";
pub const DOMAINS_KIND: &str = "domains";
pub const PLATFORM_KIND: &str = "platform";

// Relations.
pub const ADMINISTRATOR_RELATION: &str = "administrator";
pub const EDITOR_RELATION: &str = "editor";
pub const CONTRIBUTOR_RELATION: &str = "contributor";
pub const MEMBER_RELATION: &str = "member";
pub const GUEST_RELATION: &str = "guest";
pub const GROUP_RELATION: &str = "group";
pub const PARENT_GROUP_RELATION: &str = "parent_group";
pub const DOMAIN_RELATION: &str = "domain";

// Permissions.
pub const ADMIN_PERMISSION: &str = "admin";
pub const EDIT_PERMISSION: &str = "edit";
pub const VIEW_PERMISSION: &str = "view";
pub const SHARE_PERMISSION: &str = "share";
pub const MEMBERSHIP_PERMISSION: &str = "membership";
pub const DELETE_PERMISSION: &str = "delete";
pub const CREATE_PERMISSION: &str = "create";

/// The singleton root object for platform-wide checks.
pub const GRIDMESH_OBJECT: &str = "gridmesh";

/// Every permission a subject can hold on a domain.
pub const DOMAIN_PERMISSIONS: &[&str] = &[
    ADMIN_PERMISSION,
    EDIT_PERMISSION,
    VIEW_PERMISSION,
    SHARE_PERMISSION,
    MEMBERSHIP_PERMISSION,
    DELETE_PERMISSION,
    CREATE_PERMISSION,
];

/// Resolve a relation to the permission it grants.
///
/// Unknown relations pass through unchanged.
pub fn switch_to_permission(relation: &str) -> &str {
    match relation {
        ADMINISTRATOR_RELATION => ADMIN_PERMISSION,
        EDITOR_RELATION => EDIT_PERMISSION,
        CONTRIBUTOR_RELATION => VIEW_PERMISSION,
        MEMBER_RELATION => MEMBERSHIP_PERMISSION,
        GUEST_RELATION => VIEW_PERMISSION,
        GROUP_RELATION => GROUP_RELATION,
        _ => relation,
    }
}

/// Inverse of [`switch_to_permission`] for store-side filtering: the
/// relations that grant `permission`, plus the permission itself for
/// tuples recorded with a raw permission string.
pub fn relations_for_permission(permission: &str) -> Vec<String> {
    let mut relations: Vec<String> = match permission {
        ADMIN_PERMISSION => vec![ADMINISTRATOR_RELATION.to_string()],
        EDIT_PERMISSION => vec![EDITOR_RELATION.to_string()],
        VIEW_PERMISSION => vec![CONTRIBUTOR_RELATION.to_string(), GUEST_RELATION.to_string()],
        MEMBERSHIP_PERMISSION => vec![MEMBER_RELATION.to_string()],
        _ => vec![],
    };
    relations.push(permission.to_string());
    relations
}

/// Encode a domain-scoped user identity as `{domainID}_{userID}`.
///
/// Returns an empty string if either side is empty.
pub fn encode_domain_user_id(domain_id: &str, user_id: &str) -> String {
    if domain_id.is_empty() || user_id.is_empty() {
        return String::new();
    }
    format!("{}_{}", domain_id, user_id)
}

/// Decode a `{domainID}_{userID}` composite.
///
/// Valid input contains exactly one `_`; any other shape yields
/// `("", "")`.
pub fn decode_domain_user_id(domain_user_id: &str) -> (String, String) {
    let parts: Vec<&str> = domain_user_id.split('_').collect();
    if parts.len() != 2 {
        return (String::new(), String::new());
    }
    (parts[0].to_string(), parts[1].to_string())
}

/// One relation-tuple request. Empty fields are unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyReq {
    pub domain: String,
    pub subject: String,
    pub subject_type: String,
    pub subject_kind: String,
    pub subject_relation: String,
    pub relation: String,
    pub permission: String,
    pub object: String,
    pub object_kind: String,
    pub object_type: String,
}

/// One tuple returned by an agent lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRes {
    pub namespace: String,
    pub subject: String,
    pub object: String,
}

/// A page of object or subject identifiers with an opaque cursor.
#[derive(Debug, Clone, Default)]
pub struct PolicyPage {
    pub policies: Vec<String>,
    pub next_page_token: Option<String>,
}
