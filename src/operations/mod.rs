/// Domain operations
///
/// Each operation checks policy, performs the mutation through its manager
/// and appends an audit entry once the mutation has committed. Denied or
/// failed operations leave no entry.

pub mod audit;
pub mod auth;
pub mod dashboard;
pub mod ips;
pub mod permissions;
pub mod users;

use crate::{access::RoleName, audit::Values};
use serde_json::Value;

/// `a, b, c` for descriptions
fn joined<S: AsRef<str>>(items: &[S]) -> String {
    items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
}

fn role_strings(roles: &[RoleName]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

/// Build a values map from literal pairs
fn values<const N: usize>(pairs: [(&str, Value); N]) -> Values {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
