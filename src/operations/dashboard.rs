/// Dashboard counters
use crate::{
    access::{enforce, ActorContext, Requirement, UserVisibility},
    context::AppContext,
    error::IpamResult,
    users::UserStatus,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub pending_users: i64,
    pub active_users: i64,
    pub ip_count: i64,
}

/// User counts honour the same visibility as the user listing
pub async fn stats(ctx: &AppContext, actor: &ActorContext) -> IpamResult<DashboardStats> {
    enforce(actor, Requirement::Authenticated)?;
    let visibility = UserVisibility::for_actor(actor);

    Ok(DashboardStats {
        pending_users: ctx.users.count_by_status(UserStatus::Pending, visibility).await?,
        active_users: ctx.users.count_by_status(UserStatus::Active, visibility).await?,
        ip_count: ctx.ipam.count_live().await?,
    })
}
