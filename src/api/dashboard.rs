/// Dashboard endpoint
use crate::{
    access::ActorContext,
    operations::{self, dashboard::DashboardStats},
    AppContext, IpamResult,
};
use axum::{extract::State, routing::get, Json, Router};

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/dashboard/stats", get(stats))
}

async fn stats(
    State(ctx): State<AppContext>,
    actor: ActorContext,
) -> IpamResult<Json<DashboardStats>> {
    Ok(Json(operations::dashboard::stats(&ctx, &actor).await?))
}
