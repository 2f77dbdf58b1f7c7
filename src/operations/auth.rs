/// Login and logout
use crate::{
    access::{ActorContext, ClientMeta},
    audit::{AuditEvent, AuditRecord, EntityRef},
    context::AppContext,
    error::{IpamError, IpamResult},
    metrics,
    sessions::Session,
    users::{normalize_email, UserWithRoles},
};
use tracing::{info, warn};

/// A successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserWithRoles,
    pub session: Session,
}

/// Check credentials and open a session
///
/// Every refusal, including inactive accounts, leaves a `login_failed` entry.
pub async fn login(
    ctx: &AppContext,
    email: &str,
    password: &str,
    client: ClientMeta,
) -> IpamResult<LoginOutcome> {
    let user = match ctx.users.authenticate(email, password).await {
        Ok(user) => user,
        Err(e @ (IpamError::InvalidCredentials | IpamError::Forbidden(_))) => {
            metrics::record_login(false);
            warn!(client_ip = ?client.ip, "Login failed");

            let known = ctx.users.find_by_email(email).await.ok().flatten();
            let mut record = AuditRecord::new(AuditEvent::LoginFailed)
                .client(client)
                .describe(format!(
                    "Failed login attempt for '{}'",
                    normalize_email(email)
                ));
            if let Some(known) = known {
                record = record.on(EntityRef::user(known.user.id));
            }
            ctx.audit.record_best_effort(record).await;

            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let session = ctx.sessions.create(user.user.id).await?;
    metrics::record_login(true);
    info!(user_id = user.user.id, "User logged in");

    ctx.audit
        .record_best_effort(
            AuditRecord::new(AuditEvent::LoginSuccess)
                .user_id(user.user.id)
                .session(session.id.clone())
                .client(client)
                .on(EntityRef::user(user.user.id))
                .describe(format!("User '{}' logged in successfully", user.user.name)),
        )
        .await;

    Ok(LoginOutcome { user, session })
}

/// Revoke the actor's session
pub async fn logout(ctx: &AppContext, actor: &ActorContext) -> IpamResult<()> {
    if let Some(session_id) = &actor.session_id {
        ctx.sessions.revoke(session_id).await?;
    }

    info!(user_id = actor.user_id, "User logged out");

    ctx.audit
        .record_best_effort(
            AuditRecord::new(AuditEvent::Logout)
                .by(actor)
                .on(EntityRef::user(actor.user_id))
                .describe(format!("User '{}' logged out", actor.name)),
        )
        .await;

    Ok(())
}
