//! Permission policy evaluation.

use std::collections::HashMap;

use crate::auth::model::Principal;
use crate::registry::model::PermissionRule;

/// No policy, or an endpoint with no `operationName`, means the route is
/// unguarded by permissions (auth requirement, if any, is handled
/// separately) -- allowed.
pub fn check(
    principal: &Principal,
    policy: Option<&HashMap<String, PermissionRule>>,
    operation_name: Option<&str>,
) -> bool {
    let (Some(policy), Some(operation_name)) = (policy, operation_name) else {
        return true;
    };
    match policy.get(operation_name) {
        Some(rule) => principal.satisfies(&rule.any_of_permissions),
        None => true,
    }
}
