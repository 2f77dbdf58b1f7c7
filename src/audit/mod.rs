/// Append-only audit ledger
///
/// Every privileged mutation leaves one entry describing who did what to
/// which entity, with before/after snapshots. Entries are never edited or
/// removed; the storage layer rejects UPDATE and DELETE outright.

pub mod diff;
pub mod ledger;

pub use diff::{changed_fields, snapshot_of, FieldDiff, Values};
pub use ledger::AuditLedger;

use crate::{
    access::{ActorContext, ClientMeta},
    error::{IpamError, IpamResult},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Closed taxonomy of audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    UserCreated,
    UserUpdated,
    UserDeleted,
    UserStatusChanged,
    UserRoleAssigned,
    UserRoleRevoked,
    IpCreated,
    IpUpdated,
    IpDeleted,
    IpRestored,
    PermissionCreated,
    PermissionAssignedToRole,
    PermissionRevokedFromRole,
    LoginSuccess,
    LoginFailed,
    Logout,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::UserCreated => "user_created",
            AuditEvent::UserUpdated => "user_updated",
            AuditEvent::UserDeleted => "user_deleted",
            AuditEvent::UserStatusChanged => "user_status_changed",
            AuditEvent::UserRoleAssigned => "user_role_assigned",
            AuditEvent::UserRoleRevoked => "user_role_revoked",
            AuditEvent::IpCreated => "ip_created",
            AuditEvent::IpUpdated => "ip_updated",
            AuditEvent::IpDeleted => "ip_deleted",
            AuditEvent::IpRestored => "ip_restored",
            AuditEvent::PermissionCreated => "permission_created",
            AuditEvent::PermissionAssignedToRole => "permission_assigned_to_role",
            AuditEvent::PermissionRevokedFromRole => "permission_revoked_from_role",
            AuditEvent::LoginSuccess => "login_success",
            AuditEvent::LoginFailed => "login_failed",
            AuditEvent::Logout => "logout",
        }
    }

    pub fn from_str(s: &str) -> IpamResult<Self> {
        Self::all()
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| IpamError::validation("event", format!("Unknown audit event: {}", s)))
    }

    /// Default human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            AuditEvent::UserCreated => "User account created",
            AuditEvent::UserUpdated => "User account updated",
            AuditEvent::UserDeleted => "User account deleted",
            AuditEvent::UserStatusChanged => "User status changed",
            AuditEvent::UserRoleAssigned => "Role assigned to user",
            AuditEvent::UserRoleRevoked => "Role revoked from user",
            AuditEvent::IpCreated => "IP address created",
            AuditEvent::IpUpdated => "IP address updated",
            AuditEvent::IpDeleted => "IP address deleted",
            AuditEvent::IpRestored => "IP address restored",
            AuditEvent::PermissionCreated => "Permission created",
            AuditEvent::PermissionAssignedToRole => "Permission assigned to role",
            AuditEvent::PermissionRevokedFromRole => "Permission revoked from role",
            AuditEvent::LoginSuccess => "Successful login",
            AuditEvent::LoginFailed => "Failed login attempt",
            AuditEvent::Logout => "User logged out",
        }
    }

    /// Role and permission changes, readable by Developers only
    pub fn is_restricted(&self) -> bool {
        matches!(
            self,
            AuditEvent::UserRoleAssigned
                | AuditEvent::UserRoleRevoked
                | AuditEvent::PermissionCreated
                | AuditEvent::PermissionAssignedToRole
                | AuditEvent::PermissionRevokedFromRole
        )
    }

    pub fn all() -> [AuditEvent; 16] {
        [
            AuditEvent::UserCreated,
            AuditEvent::UserUpdated,
            AuditEvent::UserDeleted,
            AuditEvent::UserStatusChanged,
            AuditEvent::UserRoleAssigned,
            AuditEvent::UserRoleRevoked,
            AuditEvent::IpCreated,
            AuditEvent::IpUpdated,
            AuditEvent::IpDeleted,
            AuditEvent::IpRestored,
            AuditEvent::PermissionCreated,
            AuditEvent::PermissionAssignedToRole,
            AuditEvent::PermissionRevokedFromRole,
            AuditEvent::LoginSuccess,
            AuditEvent::LoginFailed,
            AuditEvent::Logout,
        ]
    }
}

/// Kinds of entity an entry can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    IpAddress,
    Permission,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "User",
            EntityKind::IpAddress => "IpAddress",
            EntityKind::Permission => "Permission",
        }
    }

    pub fn from_str(s: &str) -> IpamResult<Self> {
        match s {
            "User" => Ok(EntityKind::User),
            "IpAddress" => Ok(EntityKind::IpAddress),
            "Permission" => Ok(EntityKind::Permission),
            _ => Err(IpamError::Internal(format!("Unknown auditable type: {}", s))),
        }
    }
}

/// Lookup key for the affected entity; never dereferenced by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn user(id: i64) -> Self {
        Self {
            kind: EntityKind::User,
            id,
        }
    }

    pub fn ip_address(id: i64) -> Self {
        Self {
            kind: EntityKind::IpAddress,
            id,
        }
    }

    pub fn permission(id: i64) -> Self {
        Self {
            kind: EntityKind::Permission,
            id,
        }
    }
}

/// Actor summary attached to entries on read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditActor {
    pub id: i64,
    pub name: String,
}

/// A persisted audit entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub event: AuditEvent,
    pub auditable_type: Option<String>,
    pub auditable_id: Option<i64>,
    pub old_values: Option<Values>,
    pub new_values: Option<Values>,
    pub description: String,
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user: Option<AuditActor>,
}

impl AuditEntry {
    pub fn entity(&self) -> Option<EntityRef> {
        match (&self.auditable_type, self.auditable_id) {
            (Some(kind), Some(id)) => EntityKind::from_str(kind).ok().map(|kind| EntityRef { kind, id }),
            _ => None,
        }
    }
}

/// An entry to be written
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub event: AuditEvent,
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub entity: Option<EntityRef>,
    pub old_values: Option<Values>,
    pub new_values: Option<Values>,
    pub description: Option<String>,
    pub client: ClientMeta,
}

impl AuditRecord {
    pub fn new(event: AuditEvent) -> Self {
        Self {
            event,
            user_id: None,
            session_id: None,
            entity: None,
            old_values: None,
            new_values: None,
            description: None,
            client: ClientMeta::default(),
        }
    }

    /// Attribute the entry to an actor, including session and client metadata
    pub fn by(mut self, actor: &ActorContext) -> Self {
        self.user_id = Some(actor.user_id);
        self.session_id = actor.session_id.clone();
        self.client = actor.client.clone();
        self
    }

    pub fn user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn client(mut self, client: ClientMeta) -> Self {
        self.client = client;
        self
    }

    pub fn on(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn old_values(mut self, values: Values) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: Values) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Read-side filters; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    /// Matches the description or the actor's name
    pub search: Option<String>,
    pub event: Option<AuditEvent>,
    /// Inclusive
    pub date_from: Option<NaiveDate>,
    /// Inclusive
    pub date_to: Option<NaiveDate>,
}

/// Entry of the event catalogue used by filter UIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventOption {
    pub value: &'static str,
    pub label: &'static str,
}
