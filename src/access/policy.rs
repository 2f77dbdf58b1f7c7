/// Access policy evaluation and visibility overlays
use crate::{
    access::{ActorContext, RoleName},
    audit::AuditEvent,
    error::{IpamError, IpamResult},
    metrics,
    users::UserStatus,
};
use tracing::warn;

/// Generic denial message; never names the missing permission
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action";

/// What an operation requires of its actor
#[derive(Debug, Clone, Copy)]
pub enum Requirement<'a> {
    /// Any resolved actor
    Authenticated,
    Permission(&'a str),
    /// At least one of the listed permissions
    AnyOf(&'a [&'a str]),
    /// The actor must be the target user
    SelfOnly(i64),
}

/// Server-side detail of a denial
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    MissingPermission(Vec<String>),
    NotSelf { target_user_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[cfg(test)]
impl Decision {
    fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Evaluate a requirement against an actor; OR lists stop at the first match
pub fn evaluate(actor: &ActorContext, requirement: Requirement<'_>) -> Decision {
    match requirement {
        Requirement::Authenticated => Decision::Allow,
        Requirement::Permission(permission) => {
            if actor.has_permission(permission) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::MissingPermission(vec![permission.to_string()]))
            }
        }
        Requirement::AnyOf(permissions) => {
            if permissions.iter().any(|p| actor.has_permission(p)) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::MissingPermission(
                    permissions.iter().map(|p| p.to_string()).collect(),
                ))
            }
        }
        Requirement::SelfOnly(target_user_id) => {
            if actor.user_id == target_user_id {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotSelf { target_user_id })
            }
        }
    }
}

/// Evaluate and turn a denial into `Forbidden`
pub fn enforce(actor: &ActorContext, requirement: Requirement<'_>) -> IpamResult<()> {
    match evaluate(actor, requirement) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            metrics::record_policy_denial(match &reason {
                DenyReason::MissingPermission(_) => "missing_permission",
                DenyReason::NotSelf { .. } => "not_self",
            });

            match reason {
                DenyReason::MissingPermission(required) => {
                    warn!(user_id = actor.user_id, ?required, "Access denied");
                    Err(IpamError::Forbidden(FORBIDDEN_MESSAGE.to_string()))
                }
                DenyReason::NotSelf { target_user_id } => {
                    warn!(user_id = actor.user_id, target_user_id, "Access denied to another user's account");
                    Err(IpamError::Forbidden(
                        "You may only modify your own account".to_string(),
                    ))
                }
            }
        }
    }
}

/// Which users an actor may see in listings and dashboard counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserVisibility {
    pub hide_developers: bool,
    pub hide_archived: bool,
}

impl UserVisibility {
    /// Super-Admins without Developer do not see Developer accounts or archived users
    pub fn for_actor(actor: &ActorContext) -> Self {
        let restricted =
            actor.has_role(RoleName::SuperAdmin) && !actor.has_role(RoleName::Developer);

        Self {
            hide_developers: restricted,
            hide_archived: restricted,
        }
    }

    pub fn unrestricted() -> Self {
        Self {
            hide_developers: false,
            hide_archived: false,
        }
    }

    pub fn allows(&self, roles: &[RoleName], status: UserStatus) -> bool {
        !(self.hide_developers && roles.contains(&RoleName::Developer)
            || self.hide_archived && status == UserStatus::Archived)
    }
}

/// Which audit events an actor may read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditVisibility {
    pub include_restricted: bool,
}

impl AuditVisibility {
    /// Only Developers read restricted events
    pub fn for_actor(actor: &ActorContext) -> Self {
        Self {
            include_restricted: actor.has_role(RoleName::Developer),
        }
    }

    pub fn allows(&self, event: AuditEvent) -> bool {
        self.include_restricted || !event.is_restricted()
    }

    /// Event kinds that must be filtered out
    pub fn hidden_events(&self) -> Vec<AuditEvent> {
        AuditEvent::all()
            .into_iter()
            .filter(|event| !self.allows(*event))
            .collect()
    }
}
