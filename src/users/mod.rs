/// User accounts and their lifecycle
pub mod lifecycle;
pub mod password;

pub use lifecycle::{StatusChange, UserChange, UserLifecycleManager};
pub use password::PasswordHasher;

use crate::{
    access::RoleName,
    error::{FieldErrors, IpamError, IpamResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use validator::Validate;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Rejected,
    Archived,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Active => "active",
            UserStatus::Rejected => "rejected",
            UserStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> IpamResult<Self> {
        match s {
            "pending" => Ok(UserStatus::Pending),
            "active" => Ok(UserStatus::Active),
            "rejected" => Ok(UserStatus::Rejected),
            "archived" => Ok(UserStatus::Archived),
            _ => Err(IpamError::validation("status", format!("Invalid status: {}", s))),
        }
    }

    /// Whether the approval workflow expects this transition
    ///
    /// Advisory only; privileged actors may set any status.
    pub fn workflow_allows(from: UserStatus, to: UserStatus) -> bool {
        matches!(
            (from, to),
            (UserStatus::Pending, UserStatus::Active)
                | (UserStatus::Pending, UserStatus::Rejected)
                | (UserStatus::Active, UserStatus::Archived)
        )
    }

    /// Review metadata is stamped when leaving pending or entering active
    pub fn marks_review(from: UserStatus, to: UserStatus) -> bool {
        from != to && (from == UserStatus::Pending || to == UserStatus::Active)
    }
}

/// A user account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub status: UserStatus,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn from_row(row: &SqliteRow) -> IpamResult<Self> {
        let status: String = row.try_get("status")?;
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            status: UserStatus::from_str(&status)?,
            reviewed_by: row.try_get("reviewed_by")?,
            reviewed_at: row.try_get("reviewed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// A user with the names of the roles they hold
#[derive(Debug, Clone, Serialize)]
pub struct UserWithRoles {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<RoleName>,
}

impl UserWithRoles {
    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.contains(&role)
    }
}

/// Public self-registration
#[derive(Clone, Deserialize, Validate)]
pub struct Registration {
    #[validate(length(min = 1, max = 255, message = "The name field is required and may not exceed 255 characters."))]
    pub name: String,
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: String,
    #[validate(length(min = 8, message = "The password must be at least 8 characters."))]
    pub password: String,
    /// Missing counts as a mismatch
    #[serde(default)]
    pub password_confirmation: String,
}

impl Registration {
    pub fn check(&self) -> IpamResult<()> {
        let mut errors = validation_errors(self);
        if self.password_confirmation != self.password {
            errors.add("password", "The password confirmation does not match.");
        }
        errors.into_result()
    }
}

/// Admin-created account
#[derive(Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 255, message = "The name field is required and may not exceed 255 characters."))]
    pub name: String,
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: String,
    #[validate(length(min = 8, message = "The password must be at least 8 characters."))]
    pub password: String,
    pub role: RoleName,
    /// Defaults to active
    pub status: Option<UserStatus>,
}

impl NewUser {
    pub fn check(&self) -> IpamResult<()> {
        validation_errors(self).into_result()
    }
}

/// Admin edit; only supplied fields change, a supplied role replaces all roles
#[derive(Clone, Default, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(length(min = 1, max = 255, message = "The name field is required and may not exceed 255 characters."))]
    pub name: Option<String>,
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "The password must be at least 8 characters."))]
    pub password: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<RoleName>,
}

impl UserUpdate {
    pub fn check(&self) -> IpamResult<()> {
        validation_errors(self).into_result()
    }
}

/// Self-service profile edit
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 255, message = "The name field is required and may not exceed 255 characters."))]
    pub name: Option<String>,
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: Option<String>,
}

impl ProfileUpdate {
    pub fn check(&self) -> IpamResult<()> {
        validation_errors(self).into_result()
    }
}

/// Self-service password change
#[derive(Clone, Deserialize, Validate)]
pub struct PasswordChange {
    #[validate(length(min = 1, message = "The current password field is required."))]
    pub current_password: String,
    #[validate(length(min = 8, message = "The new password must be at least 8 characters."))]
    pub new_password: String,
    pub new_password_confirmation: String,
}

impl PasswordChange {
    pub fn check(&self) -> IpamResult<()> {
        let mut errors = validation_errors(self);
        if self.new_password != self.new_password_confirmation {
            errors.add("new_password", "The new password confirmation does not match.");
        }
        errors.into_result()
    }
}

/// User listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    /// Matches name or email
    pub search: Option<String>,
    pub status: Option<UserStatus>,
}

fn validation_errors<T: Validate>(input: &T) -> FieldErrors {
    match input.validate() {
        Ok(()) => FieldErrors::new(),
        Err(errors) => errors.into(),
    }
}

/// Normalized form used for storage and uniqueness checks
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
