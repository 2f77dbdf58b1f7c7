/// Audit log read operations
use crate::{
    access::{enforce, permissions, ActorContext, Requirement},
    audit::{AuditEntry, AuditFilter, EventOption},
    context::AppContext,
    db::{Page, PageRequest},
    error::IpamResult,
};

const READ: Requirement<'static> = Requirement::Permission(permissions::VIEW_USERS);

/// Filtered entries; restricted events are removed for non-Developers
pub async fn list(
    ctx: &AppContext,
    actor: &ActorContext,
    filter: &AuditFilter,
    page: PageRequest,
) -> IpamResult<Page<AuditEntry>> {
    enforce(actor, READ)?;
    ctx.audit.query(filter, page, actor).await
}

/// Event kinds the actor may filter on
pub fn catalog(ctx: &AppContext, actor: &ActorContext) -> IpamResult<Vec<EventOption>> {
    enforce(actor, READ)?;
    Ok(ctx.audit.event_catalog(actor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::RoleName,
        audit::{AuditEvent, AuditRecord},
        error::IpamError,
        operations::testing::seeded_actor,
    };

    #[tokio::test]
    async fn test_restricted_events_hidden_from_super_admin() {
        let ctx = AppContext::for_testing().await.unwrap();
        let developer = seeded_actor(&ctx, "Dev", RoleName::Developer).await;
        let admin = seeded_actor(&ctx, "Admin", RoleName::SuperAdmin).await;

        for event in [
            AuditEvent::PermissionCreated,
            AuditEvent::UserRoleAssigned,
            AuditEvent::IpCreated,
        ] {
            ctx.audit
                .record(AuditRecord::new(event).by(&developer))
                .await
                .unwrap();
        }

        let filter = AuditFilter {
            event: Some(AuditEvent::PermissionCreated),
            ..Default::default()
        };
        let page = list(&ctx, &admin, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 0);

        let page = list(&ctx, &admin, &AuditFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].event, AuditEvent::IpCreated);

        let page = list(&ctx, &developer, &AuditFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 3);

        assert_eq!(catalog(&ctx, &admin).unwrap().len(), 11);
        assert_eq!(catalog(&ctx, &developer).unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_plain_user_cannot_read() {
        let ctx = AppContext::for_testing().await.unwrap();
        let user = seeded_actor(&ctx, "Plain", RoleName::User).await;

        let err = list(&ctx, &user, &AuditFilter::default(), PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Forbidden(_)));
        assert!(catalog(&ctx, &user).is_err());
    }
}
