/// Authentication extractors
use crate::{
    access::{ActorContext, ClientMeta},
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::IpamError,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{headers::UserAgent, TypedHeader};
use std::{convert::Infallible, net::SocketAddr};

/// Originating address and user agent; never rejects
///
/// The peer address is used unless the service is configured to sit behind a
/// proxy, in which case the first `X-Forwarded-For` hop wins.
#[async_trait]
impl FromRequestParts<AppContext> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let forwarded = if state.config.service.trust_forwarded_for {
            parts
                .headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').next())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        } else {
            None
        };

        let ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        let user_agent = TypedHeader::<UserAgent>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|TypedHeader(agent)| agent.as_str().to_string());

        Ok(ClientMeta { ip, user_agent })
    }
}

/// Authenticated actor - validates the bearer token and resolves permissions
#[async_trait]
impl FromRequestParts<AppContext> for ActorContext {
    type Rejection = IpamError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or(IpamError::Unauthenticated)?;

        let session = state.sessions.validate(&token).await?;

        let user = match state.users.get_user(session.user_id).await {
            Ok(user) => user,
            Err(IpamError::NotFound(_)) => return Err(IpamError::Unauthenticated),
            Err(e) => return Err(e),
        };

        let client = match ClientMeta::from_request_parts(parts, state).await {
            Ok(client) => client,
            Err(never) => match never {},
        };

        tracing::debug!(user_id = user.user.id, "Resolved actor");

        ActorContext::resolve(&state.registry, user, Some(session.session_id), client).await
    }
}
