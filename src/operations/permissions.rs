/// Permission grid operations
use super::values;
use crate::{
    access::{enforce, permissions, ActorContext, Permission, PermissionGridRow, Requirement, RoleName},
    audit::{AuditEvent, AuditRecord, EntityRef},
    context::AppContext,
    db::{Page, PageRequest},
    error::IpamResult,
};
use serde_json::json;

const MANAGE: Requirement<'static> =
    Requirement::Permission(permissions::VIEW_ROLES_AND_PERMISSIONS);

pub async fn grid(
    ctx: &AppContext,
    actor: &ActorContext,
    search: Option<&str>,
    page: PageRequest,
) -> IpamResult<Page<PermissionGridRow>> {
    enforce(actor, MANAGE)?;
    ctx.registry.permission_grid(search, page).await
}

/// Create a permission; Developer receives it automatically
pub async fn create(ctx: &AppContext, actor: &ActorContext, name: &str) -> IpamResult<Permission> {
    enforce(actor, MANAGE)?;
    let permission = ctx.registry.create_permission(name).await?;

    ctx.audit
        .record_best_effort(
            AuditRecord::new(AuditEvent::PermissionCreated)
                .by(actor)
                .on(EntityRef::permission(permission.id))
                .new_values(values([
                    ("id", json!(permission.id)),
                    ("name", json!(permission.name)),
                ]))
                .describe(format!("Permission '{}' created", permission.name)),
        )
        .await;

    Ok(permission)
}

/// Grant or revoke; an entry is written even when nothing changed
pub async fn toggle(
    ctx: &AppContext,
    actor: &ActorContext,
    permission_id: i64,
    role: RoleName,
    enabled: bool,
) -> IpamResult<Permission> {
    enforce(actor, MANAGE)?;
    let permission = ctx.registry.set_grant(permission_id, role, enabled).await?;

    let grant = values([
        ("permission", json!(permission.name)),
        ("role", json!(role.as_str())),
    ]);

    let record = if enabled {
        AuditRecord::new(AuditEvent::PermissionAssignedToRole)
            .new_values(grant)
            .describe(format!(
                "Permission '{}' assigned to role '{}'",
                permission.name, role
            ))
    } else {
        AuditRecord::new(AuditEvent::PermissionRevokedFromRole)
            .old_values(grant)
            .describe(format!(
                "Permission '{}' revoked from role '{}'",
                permission.name, role
            ))
    };

    ctx.audit
        .record_best_effort(record.by(actor).on(EntityRef::permission(permission.id)))
        .await;

    Ok(permission)
}
