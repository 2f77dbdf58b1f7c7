/// Role/permission grid endpoints
use super::{
    extract::{ApiJson, ApiQuery},
    page_request,
};
use crate::{
    access::{ActorContext, Permission, PermissionGridRow, RoleName},
    db::Page,
    operations, AppContext, IpamResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

/// Build permission routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/permissions", get(grid))
        .route("/api/permissions/create", post(create_permission))
        .route("/api/permissions/update/:id", put(toggle_permission))
}

#[derive(Deserialize)]
struct GridQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    search: Option<String>,
}

#[derive(Deserialize)]
struct CreatePermissionRequest {
    name: String,
}

#[derive(Deserialize)]
struct TogglePermissionRequest {
    role: RoleName,
    enabled: bool,
}

async fn grid(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    ApiQuery(query): ApiQuery<GridQuery>,
) -> IpamResult<Json<Page<PermissionGridRow>>> {
    let page = page_request(&ctx, query.page, query.per_page);
    let grid = operations::permissions::grid(&ctx, &actor, query.search.as_deref(), page).await?;
    Ok(Json(grid))
}

async fn create_permission(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    ApiJson(req): ApiJson<CreatePermissionRequest>,
) -> IpamResult<(StatusCode, Json<Permission>)> {
    let permission = operations::permissions::create(&ctx, &actor, &req.name).await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

async fn toggle_permission(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<TogglePermissionRequest>,
) -> IpamResult<Json<Permission>> {
    let permission =
        operations::permissions::toggle(&ctx, &actor, id, req.role, req.enabled).await?;
    Ok(Json(permission))
}
