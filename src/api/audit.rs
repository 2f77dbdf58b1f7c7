/// Audit log endpoints
use super::{extract::ApiQuery, page_request};
use crate::{
    access::ActorContext,
    audit::{AuditEntry, AuditEvent, AuditFilter, EventOption},
    db::Page,
    operations, AppContext, IpamResult,
};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

/// Build audit routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/audit-logs", get(list_entries))
        .route("/api/audit-logs/events", get(event_catalog))
}

#[derive(Deserialize)]
struct AuditQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    search: Option<String>,
    event: Option<AuditEvent>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
}

async fn list_entries(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> IpamResult<Json<Page<AuditEntry>>> {
    let page = page_request(&ctx, query.page, query.per_page);
    let filter = AuditFilter {
        search: query.search,
        event: query.event,
        date_from: query.date_from,
        date_to: query.date_to,
    };

    Ok(Json(operations::audit::list(&ctx, &actor, &filter, page).await?))
}

async fn event_catalog(
    State(ctx): State<AppContext>,
    actor: ActorContext,
) -> IpamResult<Json<Vec<EventOption>>> {
    Ok(Json(operations::audit::catalog(&ctx, &actor)?))
}
