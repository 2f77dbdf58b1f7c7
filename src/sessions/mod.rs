/// Token sessions
///
/// Access tokens are HS256 JWTs whose `sid` claim points at a sessions row.
/// Deleting the row revokes the token before it expires.
use crate::{
    config::AuthConfig,
    error::{IpamError, IpamResult},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    sid: String,
    iat: i64,
    exp: i64,
}

/// An issued session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub access_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Identity carried by a valid token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSession {
    pub user_id: i64,
    pub session_id: String,
}

/// Issues, validates and revokes sessions
pub struct SessionManager {
    db: SqlitePool,
    jwt_secret: String,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(db: SqlitePool, config: &AuthConfig) -> Self {
        Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
            ttl: Duration::seconds(config.access_token_ttl),
        }
    }

    /// Create a session for a user
    pub async fn create(&self, user_id: i64) -> IpamResult<Session> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + self.ttl;

        let access_token = self.generate_access_token(user_id, &session_id, now, expires_at)?;

        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&session_id)
        .bind(user_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        debug!(user_id, session_id = %session_id, "Session created");

        Ok(Session {
            id: session_id,
            user_id,
            access_token,
            created_at: now,
            expires_at,
        })
    }

    /// Verify signature and expiry, then confirm the session was not revoked
    pub async fn validate(&self, token: &str) -> IpamResult<ValidatedSession> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            debug!("Rejected access token: {}", e);
            IpamError::Unauthenticated
        })?
        .claims;

        let user_id: i64 = claims.sub.parse().map_err(|_| IpamError::Unauthenticated)?;

        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE id = ?1")
            .bind(&claims.sid)
            .fetch_optional(&self.db)
            .await?
            .ok_or(IpamError::Unauthenticated)?;

        let owner: i64 = row.try_get("user_id")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;

        if owner != user_id || Utc::now() > expires_at {
            return Err(IpamError::Unauthenticated);
        }

        Ok(ValidatedSession {
            user_id,
            session_id: claims.sid,
        })
    }

    /// Delete a session (logout)
    pub async fn revoke(&self, session_id: &str) -> IpamResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await?;

        debug!(session_id, "Session revoked");
        Ok(())
    }

    /// Remove expired sessions; returns the number deleted
    pub async fn cleanup_expired(&self) -> IpamResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!("Cleaned up {} expired sessions", deleted);
        }

        Ok(deleted)
    }

    fn generate_access_token(
        &self,
        user_id: i64,
        session_id: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> IpamResult<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| IpamError::Internal(format!("Failed to generate token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ServerConfig, db};

    async fn manager() -> SessionManager {
        let pool = db::memory_pool().await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, status, created_at, updated_at) VALUES (1, 'Alice', 'alice@example.com', 'x', 'active', ?1, ?1)",
        )
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();
        SessionManager::new(pool, &ServerConfig::for_testing().authentication)
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let manager = manager().await;
        let session = manager.create(1).await.unwrap();

        let validated = manager.validate(&session.access_token).await.unwrap();
        assert_eq!(validated.user_id, 1);
        assert_eq!(validated.session_id, session.id);
    }

    #[tokio::test]
    async fn test_revoked_session_is_rejected() {
        let manager = manager().await;
        let session = manager.create(1).await.unwrap();
        manager.revoke(&session.id).await.unwrap();

        let err = manager.validate(&session.access_token).await.unwrap_err();
        assert!(matches!(err, IpamError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_foreign_signature_is_rejected() {
        let manager = manager().await;
        let session = manager.create(1).await.unwrap();

        let mut other_config = ServerConfig::for_testing().authentication;
        other_config.jwt_secret = "another-secret-that-is-long-enough-32".to_string();
        let other = SessionManager::new(manager.db.clone(), &other_config);

        assert!(other.validate(&session.access_token).await.is_err());
        assert!(manager.validate("not-a-token").await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let manager = manager().await;
        manager.create(1).await.unwrap();
        sqlx::query("INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES ('old', 1, ?1, ?1)")
            .bind(Utc::now() - Duration::hours(2))
            .execute(&manager.db)
            .await
            .unwrap();

        assert_eq!(manager.cleanup_expired().await.unwrap(), 1);
    }
}
