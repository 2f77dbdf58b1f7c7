/// Registration, login and self-service account endpoints
use super::extract::ApiJson;
use crate::{
    access::{ActorContext, ClientMeta},
    operations,
    users::{PasswordChange, ProfileUpdate, Registration, UserWithRoles},
    AppContext, IpamResult,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/profile", put(update_profile))
        .route("/api/auth/password", put(update_password))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    user: UserWithRoles,
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
}

#[derive(Serialize)]
struct MeResponse {
    #[serde(flatten)]
    user: UserWithRoles,
    permissions: BTreeSet<String>,
}

async fn register(
    State(ctx): State<AppContext>,
    client: ClientMeta,
    ApiJson(req): ApiJson<Registration>,
) -> IpamResult<(StatusCode, Json<Value>)> {
    let user = operations::users::register(&ctx, req, client).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User successfully registered. Please wait for administrator approval.",
            "user": user,
        })),
    ))
}

async fn login(
    State(ctx): State<AppContext>,
    client: ClientMeta,
    ApiJson(req): ApiJson<LoginRequest>,
) -> IpamResult<Json<LoginResponse>> {
    let outcome = operations::auth::login(&ctx, &req.email, &req.password, client).await?;

    Ok(Json(LoginResponse {
        user: outcome.user,
        access_token: outcome.session.access_token,
        token_type: "bearer",
        expires_in: ctx.config.authentication.access_token_ttl,
    }))
}

async fn logout(
    State(ctx): State<AppContext>,
    actor: ActorContext,
) -> IpamResult<Json<Value>> {
    operations::auth::logout(&ctx, &actor).await?;
    Ok(Json(json!({ "message": "Successfully logged out" })))
}

async fn me(State(ctx): State<AppContext>, actor: ActorContext) -> IpamResult<Json<MeResponse>> {
    let user = ctx.users.get_user(actor.user_id).await?;

    Ok(Json(MeResponse {
        user,
        permissions: actor.permissions,
    }))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    ApiJson(req): ApiJson<ProfileUpdate>,
) -> IpamResult<Json<UserWithRoles>> {
    let user = operations::users::update_profile(&ctx, &actor, req).await?;
    Ok(Json(user))
}

async fn update_password(
    State(ctx): State<AppContext>,
    actor: ActorContext,
    ApiJson(req): ApiJson<PasswordChange>,
) -> IpamResult<Json<Value>> {
    operations::users::update_password(&ctx, &actor, req).await?;
    Ok(Json(json!({ "message": "Password updated successfully" })))
}
