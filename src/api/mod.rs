/// API routes and handlers
pub mod audit;
pub mod auth;
pub mod dashboard;
pub mod extract;
pub mod health;
pub mod ips;
pub mod middleware;
pub mod permissions;
pub mod users;

use crate::{context::AppContext, db::PageRequest};
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(dashboard::routes())
        .merge(users::routes())
        .merge(ips::routes())
        .merge(permissions::routes())
        .merge(audit::routes())
}

/// Clamp `page`/`per_page` query values to the configured bounds
pub(crate) fn page_request(ctx: &AppContext, page: Option<u32>, per_page: Option<u32>) -> PageRequest {
    PageRequest::from_query(
        page,
        per_page.or(Some(ctx.config.audit.default_page_size)),
        ctx.config.audit.max_page_size,
    )
}
