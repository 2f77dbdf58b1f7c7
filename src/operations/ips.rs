/// IP inventory operations
use super::joined;
use crate::{
    access::{enforce, permissions, ActorContext, Requirement},
    audit::{AuditEvent, AuditRecord, EntityRef},
    context::AppContext,
    db::{Page, PageRequest},
    error::IpamResult,
    ipam::{IpAddressRecord, IpChange, IpFilter, IpUpdate, NewIp},
};

const VIEW: Requirement<'static> = Requirement::Permission(permissions::VIEW_IP_MANAGEMENT);
const DELETE: Requirement<'static> = Requirement::Permission(permissions::DELETE_IP_ADDRESS);

pub async fn list(
    ctx: &AppContext,
    actor: &ActorContext,
    filter: &IpFilter,
    page: PageRequest,
) -> IpamResult<Page<IpAddressRecord>> {
    enforce(actor, VIEW)?;
    ctx.ipam.list(filter, page).await
}

/// Create a record owned by the actor
pub async fn create(
    ctx: &AppContext,
    actor: &ActorContext,
    input: NewIp,
) -> IpamResult<IpAddressRecord> {
    enforce(actor, VIEW)?;
    let record = ctx.ipam.create(actor.user_id, input).await?;

    ctx.audit
        .record_best_effort(
            AuditRecord::new(AuditEvent::IpCreated)
                .by(actor)
                .on(EntityRef::ip_address(record.id))
                .new_values(record.audit_snapshot()?)
                .describe(format!("IP address '{}' ({}) created", record.ip, record.label)),
        )
        .await;

    Ok(record)
}

/// Edit a record; the entry holds only the fields that were persisted
pub async fn update(
    ctx: &AppContext,
    actor: &ActorContext,
    id: i64,
    input: IpUpdate,
) -> IpamResult<IpAddressRecord> {
    enforce(actor, VIEW)?;
    let change = ctx.ipam.update(actor, id, input).await?;

    if !change.diff.is_empty() {
        ctx.audit
            .record_best_effort(
                AuditRecord::new(AuditEvent::IpUpdated)
                    .by(actor)
                    .on(EntityRef::ip_address(change.record.id))
                    .old_values(change.diff.old.clone())
                    .new_values(change.diff.new.clone())
                    .describe(describe_update(&change)),
            )
            .await;
    }

    Ok(change.record)
}

fn describe_update(change: &IpChange) -> String {
    let mut description = format!(
        "IP address '{}' updated: {}",
        change.record.ip,
        joined(&change.diff.changed_keys())
    );
    if !change.dropped.is_empty() {
        description.push_str(&format!(" (not permitted: {})", joined(&change.dropped)));
    }
    description
}

pub async fn delete(ctx: &AppContext, actor: &ActorContext, id: i64) -> IpamResult<IpAddressRecord> {
    enforce(actor, DELETE)?;
    let record = ctx.ipam.soft_delete(id).await?;

    ctx.audit
        .record_best_effort(
            AuditRecord::new(AuditEvent::IpDeleted)
                .by(actor)
                .on(EntityRef::ip_address(record.id))
                .old_values(record.audit_snapshot()?)
                .describe(format!("IP address '{}' ({}) deleted", record.ip, record.label)),
        )
        .await;

    Ok(record)
}

pub async fn restore(ctx: &AppContext, actor: &ActorContext, id: i64) -> IpamResult<IpAddressRecord> {
    enforce(actor, DELETE)?;
    let record = ctx.ipam.restore(id).await?;

    ctx.audit
        .record_best_effort(
            AuditRecord::new(AuditEvent::IpRestored)
                .by(actor)
                .on(EntityRef::ip_address(record.id))
                .new_values(record.audit_snapshot()?)
                .describe(format!("IP address '{}' ({}) restored", record.ip, record.label)),
        )
        .await;

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::RoleName, error::IpamError, ipam::IpType, operations::testing::seeded_actor,
    };

    fn new_ip(ip: &str) -> NewIp {
        NewIp {
            ip: ip.to_string(),
            ip_type: IpType::V4,
            label: "core".to_string(),
            comment: None,
        }
    }

    #[tokio::test]
    async fn test_non_owner_label_only_edit() {
        let ctx = AppContext::for_testing().await.unwrap();
        let owner = seeded_actor(&ctx, "Owner", RoleName::User).await;
        let other = seeded_actor(&ctx, "Other", RoleName::User).await;

        let record = create(&ctx, &owner, new_ip("10.0.0.5")).await.unwrap();

        let updated = update(
            &ctx,
            &other,
            record.id,
            IpUpdate {
                ip: Some("10.0.0.6".to_string()),
                label: Some("x".to_string()),
                comment: Some("y".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.ip, "10.0.0.5");
        assert_eq!(updated.label, "x");
        assert_eq!(updated.comment.as_deref(), Some("y"));

        let history = ctx.audit.entries_for(EntityRef::ip_address(record.id)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event, AuditEvent::IpCreated);
        let edit = &history[1];
        assert_eq!(edit.event, AuditEvent::IpUpdated);
        assert!(!edit.new_values.as_ref().unwrap().contains_key("ip"));
        assert_eq!(
            edit.description,
            "IP address '10.0.0.5' updated: comment, label (not permitted: ip)"
        );
    }

    #[tokio::test]
    async fn test_delete_requires_permission() {
        let ctx = AppContext::for_testing().await.unwrap();
        let user = seeded_actor(&ctx, "Plain", RoleName::User).await;
        let admin = seeded_actor(&ctx, "Admin", RoleName::SuperAdmin).await;

        let record = create(&ctx, &user, new_ip("10.0.0.5")).await.unwrap();

        let err = delete(&ctx, &user, record.id).await.unwrap_err();
        assert!(matches!(err, IpamError::Forbidden(_)));

        let deleted = delete(&ctx, &admin, record.id).await.unwrap();
        assert_eq!(deleted.ip, "10.0.0.5");

        let restored = restore(&ctx, &admin, record.id).await.unwrap();
        assert!(!restored.is_deleted());

        let events: Vec<AuditEvent> = ctx
            .audit
            .entries_for(EntityRef::ip_address(record.id))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(
            events,
            vec![AuditEvent::IpCreated, AuditEvent::IpDeleted, AuditEvent::IpRestored]
        );
    }
}
