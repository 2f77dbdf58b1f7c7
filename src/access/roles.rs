/// Closed role set and permission naming
use crate::error::{IpamError, IpamResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seeded roles; never created at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleName {
    Developer,
    #[serde(rename = "Super-Admin")]
    SuperAdmin,
    User,
}

impl RoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Developer => "Developer",
            RoleName::SuperAdmin => "Super-Admin",
            RoleName::User => "User",
        }
    }

    pub fn from_str(s: &str) -> IpamResult<Self> {
        match s {
            "Developer" => Ok(RoleName::Developer),
            "Super-Admin" => Ok(RoleName::SuperAdmin),
            "User" => Ok(RoleName::User),
            _ => Err(IpamError::validation("role", format!("Invalid role: {}", s))),
        }
    }

    pub fn all() -> [RoleName; 3] {
        [RoleName::Developer, RoleName::SuperAdmin, RoleName::User]
    }

    /// Roles allowed full-field edits on records they do not own
    pub fn is_admin(&self) -> bool {
        matches!(self, RoleName::Developer | RoleName::SuperAdmin)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated kebab-case permission name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PermissionName(String);

impl PermissionName {
    /// Lowercase alphanumeric words joined by single hyphens
    pub fn parse(name: &str) -> IpamResult<Self> {
        let valid = !name.is_empty()
            && name.len() <= 255
            && name
                .split('-')
                .all(|word| !word.is_empty() && word.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));

        if valid {
            Ok(PermissionName(name.to_string()))
        } else {
            Err(IpamError::validation(
                "name",
                "The permission name must be kebab-case (lowercase letters and digits separated by single hyphens).",
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Built-in permission names
pub mod permissions {
    pub const DELETE_IP_ADDRESS: &str = "can-delete-ip-address";
    pub const VIEW_DASHBOARD: &str = "can-view-dashboard";
    pub const APPROVE_USERS: &str = "can-approve-users";
    pub const REJECT_USERS: &str = "can-reject-users";
    pub const UPDATE_USER_STATUS: &str = "can-update-user-status";
    pub const VIEW_USERS: &str = "can-view-users";
    pub const VIEW_IP_MANAGEMENT: &str = "can-view-ip-management";
    pub const VIEW_ROLES_AND_PERMISSIONS: &str = "can-view-roles-and-permissions";
    pub const VIEW_PROFILE: &str = "can-view-profile";

    pub const ALL: &[&str] = &[
        DELETE_IP_ADDRESS,
        VIEW_DASHBOARD,
        APPROVE_USERS,
        REJECT_USERS,
        UPDATE_USER_STATUS,
        VIEW_USERS,
        VIEW_IP_MANAGEMENT,
        VIEW_ROLES_AND_PERMISSIONS,
        VIEW_PROFILE,
    ];
}
