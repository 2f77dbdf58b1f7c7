/// User management endpoints
use super::{
    extract::{ApiJson, ApiQuery},
    page_request,
};
use crate::{
    access::ActorContext,
    db::Page,
    operations,
    users::{NewUser, UserFilter, UserStatus, UserUpdate, UserWithRoles},
    AppContext, IpamResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Build user management routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/create", post(create_user))
        .route("/api/users/update/:id", put(update_user))
        .route("/api/users/status/:id", patch(update_status))
}

#[derive(Deserialize)]
struct ListUsersQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    search: Option<String>,
    status: Option<UserStatus>,
}

#[derive(Deserialize)]
struct StatusRequest {
    status: UserStatus,
}

async fn list_users(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> IpamResult<Json<Page<UserWithRoles>>> {
    let page = page_request(&ctx, query.page, query.per_page);
    let filter = UserFilter {
        search: query.search,
        status: query.status,
    };

    Ok(Json(operations::users::list(&ctx, &actor, &filter, page).await?))
}

async fn create_user(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    ApiJson(req): ApiJson<NewUser>,
) -> IpamResult<(StatusCode, Json<UserWithRoles>)> {
    let user = operations::users::create(&ctx, &actor, req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UserUpdate>,
) -> IpamResult<Json<UserWithRoles>> {
    Ok(Json(operations::users::update(&ctx, &actor, id, req).await?))
}

async fn update_status(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> IpamResult<Json<Value>> {
    let user = operations::users::update_status(&ctx, &actor, id, req.status).await?;

    Ok(Json(json!({
        "message": format!("User status updated to {}.", req.status.as_str()),
        "user": user,
    })))
}
