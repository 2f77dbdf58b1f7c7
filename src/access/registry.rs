/// Role-permission registry
use crate::{
    access::{
        cache::{PermissionCache, RolePermissionMap},
        PermissionName, RoleName,
    },
    db::{self, Page, PageRequest},
    error::{IpamError, IpamResult},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// A permission record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    fn from_row(row: &SqliteRow) -> IpamResult<Self> {
        Ok(Permission {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// One row of the role/permission grid
#[derive(Debug, Clone, Serialize)]
pub struct PermissionGridRow {
    pub id: i64,
    pub name: String,
    /// Every role, keyed by display name
    pub roles: BTreeMap<String, bool>,
}

/// Stores permissions and grants, answers role lookups through the cache
pub struct RolePermissionRegistry {
    db: SqlitePool,
    cache: PermissionCache,
}

impl RolePermissionRegistry {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            cache: PermissionCache::new(),
        }
    }

    /// All grants, from the cache when possible
    async fn grants(&self) -> IpamResult<Arc<RolePermissionMap>> {
        self.cache.get(|| self.load_grants()).await
    }

    async fn load_grants(&self) -> IpamResult<RolePermissionMap> {
        let rows = sqlx::query(
            r#"
            SELECT rp.role_name, p.name
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut map: RolePermissionMap = RoleName::all()
            .into_iter()
            .map(|role| (role, BTreeSet::new()))
            .collect();

        for row in rows {
            let role_name: String = row.try_get("role_name")?;
            let permission: String = row.try_get("name")?;
            let role = RoleName::from_str(&role_name)?;
            map.entry(role).or_default().insert(permission);
        }

        Ok(map)
    }

    /// Permissions granted directly to a role
    pub async fn permissions_of_role(&self, role: RoleName) -> IpamResult<BTreeSet<String>> {
        let grants = self.grants().await?;
        Ok(grants.get(&role).cloned().unwrap_or_default())
    }

    /// Union of the permissions of every given role
    pub async fn effective_permissions(&self, roles: &[RoleName]) -> IpamResult<BTreeSet<String>> {
        let grants = self.grants().await?;
        let mut effective = BTreeSet::new();
        for role in roles {
            if let Some(names) = grants.get(role) {
                effective.extend(names.iter().cloned());
            }
        }
        Ok(effective)
    }

    /// Check if a role holds a permission
    pub async fn role_has_permission(&self, role: RoleName, permission: &str) -> IpamResult<bool> {
        let grants = self.grants().await?;
        Ok(grants
            .get(&role)
            .map(|names| names.contains(permission))
            .unwrap_or(false))
    }

    /// Find a permission by id
    pub async fn find_permission(&self, id: i64) -> IpamResult<Permission> {
        let row = sqlx::query("SELECT id, name, created_at FROM permissions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| IpamError::NotFound(format!("Permission {} not found", id)))?;

        Permission::from_row(&row)
    }

    /// Create a permission and grant it to Developer in one transaction
    pub async fn create_permission(&self, name: &str) -> IpamResult<Permission> {
        let name = PermissionName::parse(name.trim())?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let existing = sqlx::query("SELECT id FROM permissions WHERE name = ?")
            .bind(name.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(IpamError::Conflict(format!(
                "Permission '{}' already exists",
                name
            )));
        }

        let result = sqlx::query("INSERT INTO permissions (name, created_at) VALUES (?, ?)")
            .bind(name.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if db::is_unique_violation(&e) {
                    IpamError::Conflict(format!("Permission '{}' already exists", name))
                } else {
                    IpamError::from(e)
                }
            })?;
        let id = result.last_insert_rowid();

        sqlx::query("INSERT INTO role_permissions (role_name, permission_id) VALUES (?, ?)")
            .bind(RoleName::Developer.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.cache.invalidate().await;

        info!(permission = %name, "Permission created");

        Ok(Permission {
            id,
            name: name.into_inner(),
            created_at: now,
        })
    }

    /// Grant a permission to a role; granting twice is a no-op
    pub async fn grant(&self, permission_id: i64, role: RoleName) -> IpamResult<Permission> {
        let permission = self.find_permission(permission_id).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO role_permissions (role_name, permission_id) VALUES (?, ?)",
        )
        .bind(role.as_str())
        .bind(permission.id)
        .execute(&self.db)
        .await?;

        self.cache.invalidate().await;

        info!(permission = %permission.name, role = %role, "Permission granted");
        Ok(permission)
    }

    /// Revoke a permission from a role; revoking an absent grant is a no-op
    ///
    /// Developer keeps every permission, so revoking from it is refused.
    pub async fn revoke(&self, permission_id: i64, role: RoleName) -> IpamResult<Permission> {
        let permission = self.find_permission(permission_id).await?;

        if role == RoleName::Developer {
            warn!(permission = %permission.name, "Refused to revoke permission from Developer");
            return Err(IpamError::Forbidden(
                "Permissions cannot be revoked from the Developer role".to_string(),
            ));
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_name = ? AND permission_id = ?")
            .bind(role.as_str())
            .bind(permission.id)
            .execute(&self.db)
            .await?;

        self.cache.invalidate().await;

        info!(permission = %permission.name, role = %role, "Permission revoked");
        Ok(permission)
    }

    /// Grant or revoke depending on `enabled`
    pub async fn set_grant(
        &self,
        permission_id: i64,
        role: RoleName,
        enabled: bool,
    ) -> IpamResult<Permission> {
        if enabled {
            self.grant(permission_id, role).await
        } else {
            self.revoke(permission_id, role).await
        }
    }

    /// Paginated permissions with a grant flag for every role
    pub async fn permission_grid(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> IpamResult<Page<PermissionGridRow>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(db::like_pattern);

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM permissions WHERE (?1 IS NULL OR name LIKE ?1 ESCAPE '\\')",
        )
        .bind(&pattern)
        .fetch_one(&self.db)
        .await?
        .try_get("total")?;

        let rows = sqlx::query(
            r#"
            SELECT id, name, created_at
            FROM permissions
            WHERE (?1 IS NULL OR name LIKE ?1 ESCAPE '\')
            ORDER BY name ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(&pattern)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        let grants = self.grants().await?;

        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            let permission = Permission::from_row(&row)?;
            let roles = RoleName::all()
                .into_iter()
                .map(|role| {
                    let granted = grants
                        .get(&role)
                        .map(|names| names.contains(&permission.name))
                        .unwrap_or(false);
                    (role.as_str().to_string(), granted)
                })
                .collect();

            data.push(PermissionGridRow {
                id: permission.id,
                name: permission.name,
                roles,
            });
        }

        Ok(Page::new(data, page, total))
    }
}
