/// User lifecycle manager
///
/// Owns every write to the users and user_roles tables. Status rules, the
/// Developer archive prohibition and role replacement all live here so no
/// other path can bypass them.
use crate::{
    access::{enforce, permissions, ActorContext, Requirement, RoleName, UserVisibility},
    audit::{changed_fields, diff, snapshot_of, FieldDiff, Values},
    config::BootstrapConfig,
    db::{self, Page, PageRequest},
    error::{IpamError, IpamResult},
    metrics,
    users::{
        normalize_email, NewUser, PasswordChange, PasswordHasher, ProfileUpdate, Registration,
        User, UserFilter, UserStatus, UserUpdate, UserWithRoles,
    },
};
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{info, warn};

const STATUS_PERMISSIONS: &[&str] = &[permissions::APPROVE_USERS, permissions::REJECT_USERS];
const EMAIL_TAKEN: &str = "The email has already been taken.";
const DEVELOPER_ARCHIVE: &str = "Users with Developer role cannot be archived";

/// Result of a status transition
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub user: UserWithRoles,
    pub old_status: UserStatus,
    pub new_status: UserStatus,
}

/// Result of a profile or admin edit
#[derive(Debug, Clone)]
pub struct UserChange {
    pub user: UserWithRoles,
    /// Supplied fields with prior and post-commit values; never holds the password
    pub diff: FieldDiff,
    pub password_changed: bool,
    pub old_roles: Vec<RoleName>,
    pub new_roles: Vec<RoleName>,
}

impl UserChange {
    pub fn roles_changed(&self) -> bool {
        self.old_roles != self.new_roles
    }

    /// Keys that changed, password included by name only
    pub fn changed_keys(&self) -> Vec<String> {
        let mut keys = self.diff.changed_keys();
        if self.password_changed {
            keys.push("password".to_string());
        }
        keys
    }
}

/// User lifecycle manager
pub struct UserLifecycleManager {
    db: SqlitePool,
    hasher: PasswordHasher,
}

impl UserLifecycleManager {
    pub fn new(db: SqlitePool, hasher: PasswordHasher) -> Self {
        Self { db, hasher }
    }

    /// Public registration: a pending account holding the User role
    pub async fn register(&self, input: Registration) -> IpamResult<UserWithRoles> {
        input.check()?;
        let email = normalize_email(&input.email);
        let password_hash = self.hasher.hash(&input.password)?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        if email_taken(&mut tx, &email, None).await? {
            return Err(IpamError::validation("email", EMAIL_TAKEN));
        }

        let id = sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(UserStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                IpamError::validation("email", EMAIL_TAKEN)
            } else {
                IpamError::from(e)
            }
        })?
        .last_insert_rowid();

        replace_roles(&mut tx, id, &[RoleName::User]).await?;

        tx.commit().await?;
        metrics::record_registration();

        info!(user_id = id, "User registered, awaiting approval");
        self.get_user(id).await
    }

    /// Check credentials; only active users pass
    pub async fn authenticate(&self, email: &str, password: &str) -> IpamResult<UserWithRoles> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or(IpamError::InvalidCredentials)?;

        if !self.hasher.verify(password, &user.user.password_hash)? {
            return Err(IpamError::InvalidCredentials);
        }

        if user.user.status != UserStatus::Active {
            warn!(user_id = user.user.id, status = user.user.status.as_str(), "Login refused for inactive account");
            return Err(IpamError::Forbidden("Account is not active".to_string()));
        }

        Ok(user)
    }

    /// Approve, reject, archive or otherwise set a user's status
    pub async fn update_status(
        &self,
        actor: &ActorContext,
        user_id: i64,
        new_status: UserStatus,
    ) -> IpamResult<StatusChange> {
        enforce(actor, Requirement::AnyOf(STATUS_PERMISSIONS))?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let before = fetch_user(&mut tx, user_id).await?;
        let roles = fetch_roles(&mut tx, user_id).await?;
        let old_status = before.status;

        ensure_archivable(&roles, new_status)?;

        if old_status != new_status && !UserStatus::workflow_allows(old_status, new_status) {
            info!(
                user_id,
                from = old_status.as_str(),
                to = new_status.as_str(),
                actor = actor.user_id,
                "Status set outside the approval workflow"
            );
        }

        write_status(&mut tx, user_id, old_status, new_status, actor.user_id, now).await?;

        tx.commit().await?;
        metrics::record_status_transition(old_status.as_str(), new_status.as_str());

        info!(user_id, from = old_status.as_str(), to = new_status.as_str(), reviewer = actor.user_id, "User status updated");

        Ok(StatusChange {
            user: self.get_user(user_id).await?,
            old_status,
            new_status,
        })
    }

    /// Admin creation of an account with its role
    pub async fn create_with_role(
        &self,
        actor: &ActorContext,
        input: NewUser,
    ) -> IpamResult<UserWithRoles> {
        enforce(actor, Requirement::Permission(permissions::VIEW_USERS))?;
        input.check()?;

        let status = input.status.unwrap_or(UserStatus::Active);
        ensure_archivable(&[input.role], status)?;

        let email = normalize_email(&input.email);
        let password_hash = self.hasher.hash(&input.password)?;
        let now = Utc::now();
        let reviewed = status != UserStatus::Pending;

        let mut tx = self.db.begin().await?;

        if email_taken(&mut tx, &email, None).await? {
            return Err(IpamError::Conflict(EMAIL_TAKEN.to_string()));
        }

        let id = sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, status, reviewed_by, reviewed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(status.as_str())
        .bind(reviewed.then_some(actor.user_id))
        .bind(reviewed.then_some(now))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                IpamError::Conflict(EMAIL_TAKEN.to_string())
            } else {
                IpamError::from(e)
            }
        })?
        .last_insert_rowid();

        replace_roles(&mut tx, id, &[input.role]).await?;

        tx.commit().await?;

        info!(user_id = id, role = %input.role, status = status.as_str(), actor = actor.user_id, "User created by admin");
        self.get_user(id).await
    }

    /// Admin edit of supplied fields plus an optional full role replace
    pub async fn update_with_role(
        &self,
        actor: &ActorContext,
        user_id: i64,
        input: UserUpdate,
    ) -> IpamResult<UserChange> {
        enforce(actor, Requirement::Permission(permissions::VIEW_USERS))?;
        input.check()?;

        let password_hash = match &input.password {
            Some(password) => Some(self.hasher.hash(password)?),
            None => None,
        };
        let email = input.email.as_deref().map(normalize_email);
        let name = input.name.as_deref().map(str::trim);
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let before = fetch_user(&mut tx, user_id).await?;
        let old_roles = fetch_roles(&mut tx, user_id).await?;
        let new_roles = input.role.map(|r| vec![r]).unwrap_or_else(|| old_roles.clone());
        let new_status = input.status.unwrap_or(before.status);

        ensure_archivable(&new_roles, new_status)?;

        if let Some(email) = &email {
            if email_taken(&mut tx, email, Some(user_id)).await? {
                return Err(IpamError::Conflict(EMAIL_TAKEN.to_string()));
            }
        }

        sqlx::query(
            r#"
            UPDATE users
            SET name = COALESCE(?, name),
                email = COALESCE(?, email),
                password_hash = COALESCE(?, password_hash),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(&email)
        .bind(&password_hash)
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                IpamError::Conflict(EMAIL_TAKEN.to_string())
            } else {
                IpamError::from(e)
            }
        })?;

        if input.status.is_some() {
            write_status(&mut tx, user_id, before.status, new_status, actor.user_id, now).await?;
        }

        if input.role.is_some() {
            replace_roles(&mut tx, user_id, &new_roles).await?;
        }

        tx.commit().await?;

        if before.status != new_status {
            metrics::record_status_transition(before.status.as_str(), new_status.as_str());
        }

        let mut supplied = Vec::new();
        if input.name.is_some() {
            supplied.push("name");
        }
        if input.email.is_some() {
            supplied.push("email");
        }
        if input.status.is_some() {
            supplied.push("status");
        }

        let after = self.get_user(user_id).await?;
        let diff = supplied_diff(&before, &after.user, &supplied)?;

        info!(user_id, actor = actor.user_id, "User updated by admin");

        Ok(UserChange {
            new_roles: after.roles.clone(),
            user: after,
            diff,
            password_changed: password_hash.is_some(),
            old_roles,
        })
    }

    /// Self-service name/email edit
    pub async fn update_profile(
        &self,
        actor: &ActorContext,
        user_id: i64,
        input: ProfileUpdate,
    ) -> IpamResult<UserChange> {
        enforce(actor, Requirement::SelfOnly(user_id))?;
        input.check()?;

        let email = input.email.as_deref().map(normalize_email);
        let name = input.name.as_deref().map(str::trim);
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let before = fetch_user(&mut tx, user_id).await?;
        let roles = fetch_roles(&mut tx, user_id).await?;

        if let Some(email) = &email {
            if email_taken(&mut tx, email, Some(user_id)).await? {
                return Err(IpamError::validation("email", EMAIL_TAKEN));
            }
        }

        sqlx::query(
            r#"
            UPDATE users
            SET name = COALESCE(?, name),
                email = COALESCE(?, email),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(&email)
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                IpamError::validation("email", EMAIL_TAKEN)
            } else {
                IpamError::from(e)
            }
        })?;

        tx.commit().await?;

        let mut supplied = Vec::new();
        if input.name.is_some() {
            supplied.push("name");
        }
        if input.email.is_some() {
            supplied.push("email");
        }

        let after = self.get_user(user_id).await?;
        let diff = supplied_diff(&before, &after.user, &supplied)?;

        Ok(UserChange {
            user: after,
            diff,
            password_changed: false,
            old_roles: roles.clone(),
            new_roles: roles,
        })
    }

    /// Self-service password change; the current password must verify
    pub async fn update_password(
        &self,
        actor: &ActorContext,
        user_id: i64,
        input: PasswordChange,
    ) -> IpamResult<UserWithRoles> {
        enforce(actor, Requirement::SelfOnly(user_id))?;
        input.check()?;

        let user = self.get_user(user_id).await?;
        if !self.hasher.verify(&input.current_password, &user.user.password_hash)? {
            warn!(user_id, "Password change refused: current password mismatch");
            return Err(IpamError::InvalidCredentials);
        }

        let password_hash = self.hasher.hash(&input.new_password)?;

        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        info!(user_id, "Password changed");
        self.get_user(user_id).await
    }

    /// Filtered, newest-first listing with the actor's visibility applied
    pub async fn list_users(
        &self,
        actor: &ActorContext,
        filter: &UserFilter,
        page: PageRequest,
    ) -> IpamResult<Page<UserWithRoles>> {
        enforce(actor, Requirement::Permission(permissions::VIEW_USERS))?;
        let visibility = UserVisibility::for_actor(actor);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM users u");
        push_user_filters(&mut count, filter, visibility);
        let total: i64 = count.build().fetch_one(&self.db).await?.try_get("total")?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT u.* FROM users u");
        push_user_filters(&mut select, filter, visibility);
        select.push(" ORDER BY u.created_at DESC, u.id DESC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let rows = select.build().fetch_all(&self.db).await?;

        let mut conn = self.db.acquire().await?;
        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            let user = User::from_row(&row)?;
            let roles = fetch_roles(&mut conn, user.id).await?;
            data.push(UserWithRoles { user, roles });
        }

        Ok(Page::new(data, page, total))
    }

    /// Count users in a status, honouring a visibility overlay
    pub async fn count_by_status(
        &self,
        status: UserStatus,
        visibility: UserVisibility,
    ) -> IpamResult<i64> {
        let filter = UserFilter {
            search: None,
            status: Some(status),
        };

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM users u");
        push_user_filters(&mut count, &filter, visibility);
        let total: i64 = count.build().fetch_one(&self.db).await?.try_get("total")?;

        Ok(total)
    }

    /// Fetch a user with roles
    pub async fn get_user(&self, id: i64) -> IpamResult<UserWithRoles> {
        let mut conn = self.db.acquire().await?;
        let user = fetch_user(&mut conn, id).await?;
        let roles = fetch_roles(&mut conn, id).await?;
        Ok(UserWithRoles { user, roles })
    }

    pub async fn roles_of(&self, id: i64) -> IpamResult<Vec<RoleName>> {
        let mut conn = self.db.acquire().await?;
        fetch_roles(&mut conn, id).await
    }

    pub async fn find_by_email(&self, email: &str) -> IpamResult<Option<UserWithRoles>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(&self.db)
            .await?;

        match row {
            Some(row) => {
                let user = User::from_row(&row)?;
                let roles = self.roles_of(user.id).await?;
                Ok(Some(UserWithRoles { user, roles }))
            }
            None => Ok(None),
        }
    }

    /// Create the configured Developer account if no Developer exists yet
    pub async fn ensure_bootstrap_developer(
        &self,
        config: &BootstrapConfig,
    ) -> IpamResult<Option<UserWithRoles>> {
        let developers: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM user_roles WHERE role_name = ?",
        )
        .bind(RoleName::Developer.as_str())
        .fetch_one(&self.db)
        .await?
        .try_get("total")?;

        if developers > 0 {
            return Ok(None);
        }

        let email = normalize_email(&config.email);
        let password_hash = self.hasher.hash(&config.password)?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        if email_taken(&mut tx, &email, None).await? {
            warn!(email = %email, "Bootstrap email already registered, skipping");
            return Ok(None);
        }

        let id = sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, status, reviewed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(config.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(UserStatus::Active.as_str())
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        replace_roles(&mut tx, id, &[RoleName::Developer]).await?;
        tx.commit().await?;

        info!(user_id = id, "Bootstrap Developer account created");
        Ok(Some(self.get_user(id).await?))
    }
}

fn ensure_archivable(roles: &[RoleName], status: UserStatus) -> IpamResult<()> {
    if status == UserStatus::Archived && roles.contains(&RoleName::Developer) {
        warn!("Refused to archive a Developer account");
        return Err(IpamError::Forbidden(DEVELOPER_ARCHIVE.to_string()));
    }
    Ok(())
}

/// Old and post-commit values of the supplied user fields
fn supplied_diff(before: &User, after: &User, supplied: &[&str]) -> IpamResult<FieldDiff> {
    let before = diff::only(&snapshot_of(before)?, supplied);
    let after = diff::only(&snapshot_of(after)?, supplied);
    Ok(changed_fields(&before, &after))
}

fn push_user_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    filter: &UserFilter,
    visibility: UserVisibility,
) {
    builder.push(" WHERE 1 = 1");

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = db::like_pattern(search);
        builder.push(" AND (u.name LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR u.email LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }

    if let Some(status) = filter.status {
        builder.push(" AND u.status = ");
        builder.push_bind(status.as_str());
    }

    if visibility.hide_archived {
        builder.push(" AND u.status <> ");
        builder.push_bind(UserStatus::Archived.as_str());
    }

    if visibility.hide_developers {
        builder.push(
            " AND NOT EXISTS (SELECT 1 FROM user_roles ur WHERE ur.user_id = u.id AND ur.role_name = ",
        );
        builder.push_bind(RoleName::Developer.as_str());
        builder.push(")");
    }
}

async fn fetch_user(conn: &mut SqliteConnection, id: i64) -> IpamResult<User> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| IpamError::NotFound(format!("User {} not found", id)))?;

    User::from_row(&row)
}

async fn fetch_roles(conn: &mut SqliteConnection, user_id: i64) -> IpamResult<Vec<RoleName>> {
    let rows = sqlx::query("SELECT role_name FROM user_roles WHERE user_id = ? ORDER BY role_name")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| {
            let name: String = row.try_get("role_name")?;
            RoleName::from_str(&name)
        })
        .collect()
}

async fn replace_roles(
    conn: &mut SqliteConnection,
    user_id: i64,
    roles: &[RoleName],
) -> IpamResult<()> {
    sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for role in roles {
        sqlx::query("INSERT INTO user_roles (user_id, role_name) VALUES (?, ?)")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn email_taken(
    conn: &mut SqliteConnection,
    email: &str,
    except_user: Option<i64>,
) -> IpamResult<bool> {
    let row = sqlx::query("SELECT id FROM users WHERE email = ? AND (? IS NULL OR id <> ?)")
        .bind(email)
        .bind(except_user)
        .bind(except_user)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.is_some())
}

async fn write_status(
    conn: &mut SqliteConnection,
    user_id: i64,
    old_status: UserStatus,
    new_status: UserStatus,
    reviewer_id: i64,
    now: chrono::DateTime<Utc>,
) -> IpamResult<()> {
    if UserStatus::marks_review(old_status, new_status) {
        sqlx::query(
            "UPDATE users SET status = ?, reviewed_by = ?, reviewed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(new_status.as_str())
        .bind(reviewer_id)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    } else {
        sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(new_status.as_str())
            .bind(now)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Snapshot helper for audit payloads of newly created users
pub fn created_values(user: &User) -> IpamResult<Values> {
    Ok(diff::only(&snapshot_of(user)?, &["id", "name", "email", "status"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::actor::testing::actor;
    use crate::config::ServerConfig;

    async fn manager() -> UserLifecycleManager {
        let pool = db::memory_pool().await.unwrap();
        let hasher =
            PasswordHasher::new(ServerConfig::for_testing().authentication.password_hashing)
                .unwrap();
        UserLifecycleManager::new(pool, hasher)
    }

    fn registration(name: &str, email: &str) -> Registration {
        Registration {
            name: name.to_string(),
            email: email.to_string(),
            password: "password123".to_string(),
            password_confirmation: "password123".to_string(),
        }
    }

    fn admin() -> ActorContext {
        actor(
            42,
            &[RoleName::SuperAdmin],
            &[
                permissions::VIEW_USERS,
                permissions::APPROVE_USERS,
                permissions::REJECT_USERS,
            ],
        )
    }

    fn developer() -> ActorContext {
        actor(43, &[RoleName::Developer], permissions::ALL)
    }

    async fn seed_reviewer(manager: &UserLifecycleManager, id: i64) {
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, status, created_at, updated_at) VALUES (?, 'Reviewer', ?, 'x', 'active', ?, ?)",
        )
        .bind(id)
        .bind(format!("reviewer{}@example.com", id))
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&manager.db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_register_creates_pending_user_role() {
        let manager = manager().await;
        let user = manager
            .register(registration("Alice", "Alice@Example.com"))
            .await
            .unwrap();

        assert_eq!(user.user.status, UserStatus::Pending);
        assert_eq!(user.roles, vec![RoleName::User]);
        assert_eq!(user.user.email, "alice@example.com");
        assert!(user.user.reviewed_by.is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_email_is_field_error() {
        let manager = manager().await;
        manager.register(registration("Alice", "alice@example.com")).await.unwrap();

        let err = manager
            .register(registration("Alice Two", "ALICE@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Validation(ref f) if f.contains("email")));
    }

    #[tokio::test]
    async fn test_pending_user_cannot_authenticate() {
        let manager = manager().await;
        manager.register(registration("Alice", "alice@example.com")).await.unwrap();

        let err = manager
            .authenticate("alice@example.com", "password123")
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_bad_credentials_are_indistinguishable() {
        let manager = manager().await;
        manager.register(registration("Alice", "alice@example.com")).await.unwrap();

        let unknown = manager.authenticate("nobody@example.com", "password123").await;
        let wrong = manager.authenticate("alice@example.com", "wrong-password").await;

        assert!(matches!(unknown, Err(IpamError::InvalidCredentials)));
        assert!(matches!(wrong, Err(IpamError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_approval_sets_reviewer() {
        let manager = manager().await;
        seed_reviewer(&manager, 42).await;
        let alice = manager.register(registration("Alice", "alice@example.com")).await.unwrap();

        let change = manager
            .update_status(&admin(), alice.user.id, UserStatus::Active)
            .await
            .unwrap();

        assert_eq!(change.old_status, UserStatus::Pending);
        assert_eq!(change.new_status, UserStatus::Active);
        assert_eq!(change.user.user.status, UserStatus::Active);
        assert_eq!(change.user.user.reviewed_by, Some(42));
        assert!(change.user.user.reviewed_at.is_some());

        let authed = manager.authenticate("alice@example.com", "password123").await.unwrap();
        assert_eq!(authed.user.id, alice.user.id);
    }

    #[tokio::test]
    async fn test_status_requires_permission() {
        let manager = manager().await;
        let alice = manager.register(registration("Alice", "alice@example.com")).await.unwrap();

        let viewer = actor(9, &[RoleName::User], &[permissions::VIEW_USERS]);
        let err = manager
            .update_status(&viewer, alice.user.id, UserStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Forbidden(_)));

        let unchanged = manager.get_user(alice.user.id).await.unwrap();
        assert_eq!(unchanged.user.status, UserStatus::Pending);
    }

    #[tokio::test]
    async fn test_developer_cannot_be_archived() {
        let manager = manager().await;
        seed_reviewer(&manager, 43).await;
        let dev = manager
            .create_with_role(
                &developer(),
                NewUser {
                    name: "Dev".to_string(),
                    email: "dev@example.com".to_string(),
                    password: "password123".to_string(),
                    role: RoleName::Developer,
                    status: None,
                },
            )
            .await
            .unwrap();

        let err = manager
            .update_status(&developer(), dev.user.id, UserStatus::Archived)
            .await
            .unwrap_err();
        match err {
            IpamError::Forbidden(reason) => assert_eq!(reason, DEVELOPER_ARCHIVE),
            other => panic!("unexpected error: {:?}", other),
        }

        // The generic update path enforces the same rule
        let err = manager
            .update_with_role(
                &developer(),
                dev.user.id,
                UserUpdate {
                    status: Some(UserStatus::Archived),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Forbidden(_)));

        let unchanged = manager.get_user(dev.user.id).await.unwrap();
        assert_eq!(unchanged.user.status, UserStatus::Active);
    }

    #[tokio::test]
    async fn test_create_with_role_duplicate_is_conflict() {
        let manager = manager().await;
        seed_reviewer(&manager, 42).await;
        manager.register(registration("Alice", "alice@example.com")).await.unwrap();

        let err = manager
            .create_with_role(
                &admin(),
                NewUser {
                    name: "Other".to_string(),
                    email: "alice@example.com".to_string(),
                    password: "password123".to_string(),
                    role: RoleName::User,
                    status: Some(UserStatus::Active),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_with_role_diff_and_roles() {
        let manager = manager().await;
        seed_reviewer(&manager, 43).await;
        let bob = manager.register(registration("Bob", "bob@example.com")).await.unwrap();

        let change = manager
            .update_with_role(
                &developer(),
                bob.user.id,
                UserUpdate {
                    name: Some("Robert".to_string()),
                    email: Some("bob@example.com".to_string()),
                    password: Some("new-password-1".to_string()),
                    role: Some(RoleName::SuperAdmin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let old_keys: Vec<&String> = change.diff.old.keys().collect();
        let new_keys: Vec<&String> = change.diff.new.keys().collect();
        assert_eq!(old_keys, new_keys);
        assert_eq!(new_keys, vec!["email", "name"]);
        assert_eq!(change.diff.old["name"], "Bob");
        assert_eq!(change.diff.new["name"], "Robert");
        assert!(!change.diff.new.contains_key("password"));
        assert!(!change.diff.new.contains_key("password_hash"));
        assert_eq!(change.changed_keys(), vec!["name".to_string(), "password".to_string()]);

        assert!(change.roles_changed());
        assert_eq!(change.old_roles, vec![RoleName::User]);
        assert_eq!(change.new_roles, vec![RoleName::SuperAdmin]);
    }

    #[tokio::test]
    async fn test_update_without_role_keeps_roles() {
        let manager = manager().await;
        seed_reviewer(&manager, 43).await;
        let bob = manager.register(registration("Bob", "bob@example.com")).await.unwrap();

        let change = manager
            .update_with_role(
                &developer(),
                bob.user.id,
                UserUpdate {
                    status: Some(UserStatus::Rejected),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!change.roles_changed());
        assert_eq!(change.user.user.status, UserStatus::Rejected);
        assert_eq!(change.diff.old["status"], "pending");
        assert_eq!(change.diff.new["status"], "rejected");
    }

    #[tokio::test]
    async fn test_profile_is_self_only() {
        let manager = manager().await;
        let alice = manager.register(registration("Alice", "alice@example.com")).await.unwrap();
        let bob = manager.register(registration("Bob", "bob@example.com")).await.unwrap();

        let alice_actor = actor(alice.user.id, &[RoleName::User], &[]);

        let err = manager
            .update_profile(
                &alice_actor,
                bob.user.id,
                ProfileUpdate {
                    name: Some("Hacked".to_string()),
                    email: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Forbidden(_)));

        let err = manager
            .update_profile(
                &alice_actor,
                alice.user.id,
                ProfileUpdate {
                    name: None,
                    email: Some("bob@example.com".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::Validation(ref f) if f.contains("email")));

        let change = manager
            .update_profile(
                &alice_actor,
                alice.user.id,
                ProfileUpdate {
                    name: Some("Alicia".to_string()),
                    email: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(change.user.user.name, "Alicia");
        assert_eq!(change.diff.old["name"], "Alice");
    }

    #[tokio::test]
    async fn test_password_change_requires_current_password() {
        let manager = manager().await;
        let alice = manager.register(registration("Alice", "alice@example.com")).await.unwrap();
        let alice_actor = actor(alice.user.id, &[RoleName::User], &[]);

        let err = manager
            .update_password(
                &alice_actor,
                alice.user.id,
                PasswordChange {
                    current_password: "not-my-password".to_string(),
                    new_password: "brand-new-pass".to_string(),
                    new_password_confirmation: "brand-new-pass".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IpamError::InvalidCredentials));

        manager
            .update_password(
                &alice_actor,
                alice.user.id,
                PasswordChange {
                    current_password: "password123".to_string(),
                    new_password: "brand-new-pass".to_string(),
                    new_password_confirmation: "brand-new-pass".to_string(),
                },
            )
            .await
            .unwrap();

        let user = manager.get_user(alice.user.id).await.unwrap();
        assert!(manager.hasher.verify("brand-new-pass", &user.user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_super_admin_listing_hides_developers_and_archived() {
        let manager = manager().await;
        seed_reviewer(&manager, 43).await;
        let dev = developer();

        manager
            .create_with_role(
                &dev,
                NewUser {
                    name: "Dev Two".to_string(),
                    email: "dev2@example.com".to_string(),
                    password: "password123".to_string(),
                    role: RoleName::Developer,
                    status: None,
                },
            )
            .await
            .unwrap();
        let carol = manager.register(registration("Carol", "carol@example.com")).await.unwrap();
        manager.register(registration("Dan", "dan@example.com")).await.unwrap();
        manager
            .update_status(&dev, carol.user.id, UserStatus::Active)
            .await
            .unwrap();
        manager
            .update_status(&dev, carol.user.id, UserStatus::Archived)
            .await
            .unwrap();

        let super_admin = admin();
        let page = manager
            .list_users(&super_admin, &UserFilter::default(), PageRequest::default())
            .await
            .unwrap();
        let names: Vec<&str> = page.data.iter().map(|u| u.user.name.as_str()).collect();
        assert!(names.contains(&"Dan"));
        assert!(names.contains(&"Reviewer"));
        assert!(!names.contains(&"Dev Two"));
        assert!(!names.contains(&"Carol"));

        let page = manager
            .list_users(&dev, &UserFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 4);

        let search = UserFilter {
            search: Some("dan@".to_string()),
            status: Some(UserStatus::Pending),
        };
        let page = manager.list_users(&dev, &search, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);

        let pending = manager
            .count_by_status(UserStatus::Pending, UserVisibility::for_actor(&super_admin))
            .await
            .unwrap();
        assert_eq!(pending, 1);
    }

    #[tokio::test]
    async fn test_bootstrap_developer_once() {
        let manager = manager().await;
        let config = BootstrapConfig {
            name: "Root".to_string(),
            email: "root@example.com".to_string(),
            password: "password123".to_string(),
        };

        let created = manager.ensure_bootstrap_developer(&config).await.unwrap().unwrap();
        assert_eq!(created.roles, vec![RoleName::Developer]);
        assert_eq!(created.user.status, UserStatus::Active);

        assert!(manager.ensure_bootstrap_developer(&config).await.unwrap().is_none());
    }
}
