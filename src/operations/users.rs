/// User management operations
use super::{joined, role_strings, values};
use crate::{
    access::{ActorContext, ClientMeta, RoleName},
    audit::{AuditEvent, AuditRecord, EntityRef},
    context::AppContext,
    db::{Page, PageRequest},
    error::IpamResult,
    users::{
        lifecycle::created_values, NewUser, PasswordChange, ProfileUpdate, Registration, User,
        UserChange, UserFilter, UserStatus, UserUpdate, UserWithRoles,
    },
};
use serde_json::json;

/// Public self-registration
pub async fn register(
    ctx: &AppContext,
    input: Registration,
    client: ClientMeta,
) -> IpamResult<UserWithRoles> {
    let user = ctx.users.register(input).await?;

    ctx.audit
        .record_best_effort(user_created(&user.user)?.client(client))
        .await;

    Ok(user)
}

pub async fn list(
    ctx: &AppContext,
    actor: &ActorContext,
    filter: &UserFilter,
    page: PageRequest,
) -> IpamResult<Page<UserWithRoles>> {
    ctx.users.list_users(actor, filter, page).await
}

/// Admin creation: the account plus its initial role assignment
pub async fn create(
    ctx: &AppContext,
    actor: &ActorContext,
    input: NewUser,
) -> IpamResult<UserWithRoles> {
    let user = ctx.users.create_with_role(actor, input).await?;

    ctx.audit.record_best_effort(user_created(&user.user)?.by(actor)).await;
    ctx.audit
        .record_best_effort(roles_changed(actor, &user.user, &[], &user.roles))
        .await;

    Ok(user)
}

/// Admin edit of supplied fields and, optionally, the role
pub async fn update(
    ctx: &AppContext,
    actor: &ActorContext,
    user_id: i64,
    input: UserUpdate,
) -> IpamResult<UserWithRoles> {
    let change = ctx.users.update_with_role(actor, user_id, input).await?;

    record_user_updated(ctx, actor, &change).await;

    if let Some((old, new)) = status_transition(&change) {
        ctx.audit
            .record_best_effort(status_changed(actor, &change.user.user, old, new))
            .await;
    }

    if change.roles_changed() {
        ctx.audit
            .record_best_effort(roles_changed(
                actor,
                &change.user.user,
                &change.old_roles,
                &change.new_roles,
            ))
            .await;
    }

    Ok(change.user)
}

/// Approve, reject, archive or reinstate a user
pub async fn update_status(
    ctx: &AppContext,
    actor: &ActorContext,
    user_id: i64,
    status: UserStatus,
) -> IpamResult<UserWithRoles> {
    let change = ctx.users.update_status(actor, user_id, status).await?;

    ctx.audit
        .record_best_effort(status_changed(
            actor,
            &change.user.user,
            change.old_status.as_str(),
            change.new_status.as_str(),
        ))
        .await;

    Ok(change.user)
}

/// Self-service name/email edit of the actor's own account
pub async fn update_profile(
    ctx: &AppContext,
    actor: &ActorContext,
    input: ProfileUpdate,
) -> IpamResult<UserWithRoles> {
    let change = ctx.users.update_profile(actor, actor.user_id, input).await?;
    record_user_updated(ctx, actor, &change).await;
    Ok(change.user)
}

/// Self-service password change; the entry carries no values
pub async fn update_password(
    ctx: &AppContext,
    actor: &ActorContext,
    input: PasswordChange,
) -> IpamResult<UserWithRoles> {
    let user = ctx.users.update_password(actor, actor.user_id, input).await?;

    ctx.audit
        .record_best_effort(
            AuditRecord::new(AuditEvent::UserUpdated)
                .by(actor)
                .on(EntityRef::user(user.user.id))
                .describe(format!("User '{}' updated: password", user.user.name)),
        )
        .await;

    Ok(user)
}

fn user_created(user: &User) -> IpamResult<AuditRecord> {
    Ok(AuditRecord::new(AuditEvent::UserCreated)
        .on(EntityRef::user(user.id))
        .new_values(created_values(user)?)
        .describe(format!("User '{}' created", user.name)))
}

fn status_changed(actor: &ActorContext, user: &User, old: &str, new: &str) -> AuditRecord {
    AuditRecord::new(AuditEvent::UserStatusChanged)
        .by(actor)
        .on(EntityRef::user(user.id))
        .old_values(values([("status", json!(old))]))
        .new_values(values([("status", json!(new))]))
        .describe(format!(
            "User '{}' status changed from '{}' to '{}'",
            user.name, old, new
        ))
}

/// Prior and new status when an edit moved it
fn status_transition(change: &UserChange) -> Option<(&str, &str)> {
    let old = change.diff.old.get("status")?.as_str()?;
    let new = change.diff.new.get("status")?.as_str()?;
    (old != new).then_some((old, new))
}

fn roles_changed(
    actor: &ActorContext,
    user: &User,
    old_roles: &[RoleName],
    new_roles: &[RoleName],
) -> AuditRecord {
    let old_roles = role_strings(old_roles);
    let new_roles = role_strings(new_roles);

    AuditRecord::new(AuditEvent::UserRoleAssigned)
        .by(actor)
        .on(EntityRef::user(user.id))
        .describe(format!(
            "User '{}' roles changed from [{}] to [{}]",
            user.name,
            joined(&old_roles),
            joined(&new_roles)
        ))
        .old_values(values([("roles", json!(old_roles))]))
        .new_values(values([("roles", json!(new_roles))]))
}

/// Nothing is written when no field was supplied
async fn record_user_updated(ctx: &AppContext, actor: &ActorContext, change: &UserChange) {
    if change.diff.is_empty() && !change.password_changed {
        return;
    }

    let user = &change.user.user;
    let mut record = AuditRecord::new(AuditEvent::UserUpdated)
        .by(actor)
        .on(EntityRef::user(user.id))
        .describe(format!(
            "User '{}' updated: {}",
            user.name,
            joined(&change.changed_keys())
        ));

    if !change.diff.is_empty() {
        record = record
            .old_values(change.diff.old.clone())
            .new_values(change.diff.new.clone());
    }

    ctx.audit.record_best_effort(record).await;
}
