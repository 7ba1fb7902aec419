//! Identity and authorization result types.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalType {
    User,
    Service,
    System,
}

/// `{id, name, type, attributes}` plus, when present, a `permissions` set.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub principal_type: PrincipalType,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub permissions: Option<HashSet<String>>,
}

impl Principal {
    /// Empty intersection with the policy's `anyOfPermissions` is
    /// `Forbidden`; a wildcard on either side allows everything.
    pub fn satisfies(&self, any_of: &HashSet<String>) -> bool {
        if any_of.contains("*") {
            return true;
        }
        match &self.permissions {
            Some(perms) if perms.contains("*") => true,
            Some(perms) => perms.intersection(any_of).next().is_some(),
            None => false,
        }
    }
}

/// A short-lived aussie-issued JWS forwarded downstream.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
    pub session_id: Option<String>,
    pub claim_names: Vec<String>,
}

/// Sum type produced by the auth pipeline.
#[derive(Clone, Debug)]
pub enum RouteAuthResult {
    Authenticated { issued: IssuedToken, principal: Principal },
    NotRequired,
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
}

impl RouteAuthResult {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RouteAuthResult::Authenticated { .. } | RouteAuthResult::NotRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(perms: Option<&[&str]>) -> Principal {
        Principal {
            id: "u1".into(),
            name: "user one".into(),
            principal_type: PrincipalType::User,
            attributes: HashMap::new(),
            permissions: perms.map(|p| p.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn empty_intersection_is_denied() {
        let p = principal(Some(&["svc-a.readonly"]));
        let required: HashSet<String> = ["svc-a.admin".to_string()].into_iter().collect();
        assert!(!p.satisfies(&required));
    }

    #[test]
    fn matching_permission_is_allowed() {
        let p = principal(Some(&["svc-a.admin"]));
        let required: HashSet<String> = ["svc-a.admin".to_string()].into_iter().collect();
        assert!(p.satisfies(&required));
    }

    #[test]
    fn wildcard_principal_permission_allows_anything() {
        let p = principal(Some(&["*"]));
        let required: HashSet<String> = ["svc-a.admin".to_string()].into_iter().collect();
        assert!(p.satisfies(&required));
    }

    #[test]
    fn wildcard_policy_allows_any_permission() {
        let p = principal(Some(&["svc-a.whatever"]));
        let required: HashSet<String> = ["*".to_string()].into_iter().collect();
        assert!(p.satisfies(&required));
    }

    #[test]
    fn principal_with_no_permissions_is_denied() {
        let p = principal(None);
        let required: HashSet<String> = ["svc-a.admin".to_string()].into_iter().collect();
        assert!(!p.satisfies(&required));
    }
}
