/// Role-scoped access control
///
/// Roles and permission names, the cached role-permission registry, the
/// per-request actor context and the policy evaluator.

pub mod actor;
pub mod cache;
pub mod policy;
pub mod registry;
pub mod roles;

pub use actor::{ActorContext, ClientMeta};
pub use cache::PermissionCache;
pub use policy::{enforce, evaluate, AuditVisibility, Decision, DenyReason, Requirement, UserVisibility};
pub use registry::{Permission, PermissionGridRow, RolePermissionRegistry};
pub use roles::{permissions, PermissionName, RoleName};
