/// IP inventory endpoints
use super::{
    extract::{ApiJson, ApiQuery},
    page_request,
};
use crate::{
    access::ActorContext,
    db::Page,
    ipam::{IpAddressRecord, IpFilter, IpType, IpUpdate, NewIp},
    operations, AppContext, IpamResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Build IP inventory routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/ips", get(list_ips))
        .route("/api/ips/create", post(create_ip))
        .route("/api/ips/update/:id", put(update_ip))
        .route("/api/ips/delete/:id", delete(delete_ip))
        .route("/api/ips/restore/:id", post(restore_ip))
}

#[derive(Deserialize)]
struct ListIpsQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    search: Option<String>,
    #[serde(rename = "type")]
    ip_type: Option<IpType>,
}

async fn list_ips(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    ApiQuery(query): ApiQuery<ListIpsQuery>,
) -> IpamResult<Json<Page<IpAddressRecord>>> {
    let page = page_request(&ctx, query.page, query.per_page);
    let filter = IpFilter {
        search: query.search,
        ip_type: query.ip_type,
    };

    Ok(Json(operations::ips::list(&ctx, &actor, &filter, page).await?))
}

async fn create_ip(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    ApiJson(req): ApiJson<NewIp>,
) -> IpamResult<(StatusCode, Json<IpAddressRecord>)> {
    let record = operations::ips::create(&ctx, &actor, req).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_ip(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<IpUpdate>,
) -> IpamResult<Json<IpAddressRecord>> {
    Ok(Json(operations::ips::update(&ctx, &actor, id, req).await?))
}

async fn delete_ip(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    Path(id): Path<i64>,
) -> IpamResult<Json<Value>> {
    let record = operations::ips::delete(&ctx, &actor, id).await?;

    Ok(Json(json!({
        "message": format!("IP address {} deleted", record.ip),
        "id": record.id,
    })))
}

async fn restore_ip(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    Path(id): Path<i64>,
) -> IpamResult<Json<IpAddressRecord>> {
    Ok(Json(operations::ips::restore(&ctx, &actor, id).await?))
}
