/// IP inventory manager
use crate::{
    access::ActorContext,
    audit::{changed_fields, diff, snapshot_of, FieldDiff},
    db::{self, Page, PageRequest},
    error::{IpamError, IpamResult},
    ipam::{IpAddressRecord, IpFilter, IpUpdate, NewIp},
};
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

/// Result of an edit: the stored record and what was persisted
#[derive(Debug, Clone)]
pub struct IpChange {
    pub record: IpAddressRecord,
    /// Only the fields that were written
    pub diff: FieldDiff,
    /// Fields the editor supplied but may not change
    pub dropped: Vec<&'static str>,
}

/// Stores IP address records with soft deletion
pub struct IpInventoryManager {
    db: SqlitePool,
}

impl IpInventoryManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Live records, newest first
    pub async fn list(
        &self,
        filter: &IpFilter,
        page: PageRequest,
    ) -> IpamResult<Page<IpAddressRecord>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM ip_addresses");
        push_ip_filters(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.db).await?.try_get("total")?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM ip_addresses");
        push_ip_filters(&mut select, filter);
        select.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let records = select
            .build()
            .fetch_all(&self.db)
            .await?
            .iter()
            .map(IpAddressRecord::from_row)
            .collect::<IpamResult<Vec<_>>>()?;

        Ok(Page::new(records, page, total))
    }

    /// A live record
    pub async fn get(&self, id: i64) -> IpamResult<IpAddressRecord> {
        let mut conn = self.db.acquire().await?;
        fetch_live(&mut conn, id).await
    }

    pub async fn create(&self, owner_id: i64, input: NewIp) -> IpamResult<IpAddressRecord> {
        input.check()?;

        let ip = input.ip.trim().to_string();
        let comment = input.comment.filter(|c| !c.trim().is_empty());
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        if live_ip_taken(&mut tx, &ip, None).await? {
            return Err(duplicate_ip(&ip));
        }

        let id = sqlx::query(
            r#"
            INSERT INTO ip_addresses (ip, type, label, comment, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ip)
        .bind(input.ip_type.as_str())
        .bind(input.label.trim())
        .bind(&comment)
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                duplicate_ip(&ip)
            } else {
                IpamError::from(e)
            }
        })?
        .last_insert_rowid();

        let record = fetch_live(&mut tx, id).await?;
        tx.commit().await?;

        info!(ip_id = id, ip = %record.ip, owner = owner_id, "IP address created");
        Ok(record)
    }

    /// Edit a record; non-owners without an admin role may only touch label and comment
    pub async fn update(
        &self,
        actor: &ActorContext,
        id: i64,
        input: IpUpdate,
    ) -> IpamResult<IpChange> {
        input.check()?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let before = fetch_live(&mut tx, id).await?;

        let full_edit = before.user_id == Some(actor.user_id) || actor.is_admin();
        let mut dropped = Vec::new();
        let input = if full_edit {
            input
        } else {
            if input.ip.is_some() {
                dropped.push("ip");
            }
            if input.ip_type.is_some() {
                dropped.push("type");
            }
            input.restrict_to_annotations()
        };

        if !dropped.is_empty() {
            debug!(ip_id = id, actor = actor.user_id, ?dropped, "Ignoring restricted IP fields");
        }

        let ip = input.ip.as_deref().map(str::trim).unwrap_or(&before.ip).to_string();
        let ip_type = input.ip_type.unwrap_or(before.ip_type);
        if (input.ip.is_some() || input.ip_type.is_some()) && !ip_type.accepts(&ip) {
            return Err(IpamError::validation(
                "ip",
                format!("The ip must be a valid {} address.", ip_type.as_str()),
            ));
        }

        if input.ip.is_some() && live_ip_taken(&mut tx, &ip, Some(id)).await? {
            return Err(duplicate_ip(&ip));
        }

        let comment = input
            .comment
            .as_ref()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        sqlx::query(
            r#"
            UPDATE ip_addresses
            SET ip = ?1,
                type = ?2,
                label = COALESCE(?3, label),
                comment = CASE WHEN ?4 THEN ?5 ELSE comment END,
                updated_at = ?6
            WHERE id = ?7
            "#,
        )
        .bind(&ip)
        .bind(ip_type.as_str())
        .bind(input.label.as_deref().map(str::trim))
        .bind(input.comment.is_some())
        .bind(&comment)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                duplicate_ip(&ip)
            } else {
                IpamError::from(e)
            }
        })?;

        let after = fetch_live(&mut tx, id).await?;
        tx.commit().await?;

        let mut written = Vec::new();
        if input.ip.is_some() {
            written.push("ip");
        }
        if input.ip_type.is_some() {
            written.push("type");
        }
        if input.label.is_some() {
            written.push("label");
        }
        if input.comment.is_some() {
            written.push("comment");
        }

        let diff = changed_fields(
            &diff::only(&snapshot_of(&before)?, &written),
            &diff::only(&snapshot_of(&after)?, &written),
        );

        info!(ip_id = id, actor = actor.user_id, "IP address updated");

        Ok(IpChange {
            record: after,
            diff,
            dropped,
        })
    }

    /// Mark a live record deleted
    pub async fn soft_delete(&self, id: i64) -> IpamResult<IpAddressRecord> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let record = fetch_live(&mut tx, id).await?;

        sqlx::query("UPDATE ip_addresses SET deleted_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(ip_id = id, ip = %record.ip, "IP address deleted");
        Ok(record)
    }

    /// Bring a deleted record back, unless its address was reused meanwhile
    pub async fn restore(&self, id: i64) -> IpamResult<IpAddressRecord> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query("SELECT * FROM ip_addresses WHERE id = ? AND deleted_at IS NOT NULL")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| IpamError::NotFound(format!("Deleted IP address {} not found", id)))?;
        let record = IpAddressRecord::from_row(&row)?;

        if live_ip_taken(&mut tx, &record.ip, Some(id)).await? {
            return Err(IpamError::Conflict(format!(
                "IP address {} is already in use by another record",
                record.ip
            )));
        }

        sqlx::query("UPDATE ip_addresses SET deleted_at = NULL, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let restored = fetch_live(&mut tx, id).await?;
        tx.commit().await?;

        info!(ip_id = id, ip = %restored.ip, "IP address restored");
        Ok(restored)
    }

    pub async fn count_live(&self) -> IpamResult<i64> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM ip_addresses WHERE deleted_at IS NULL")
            .fetch_one(&self.db)
            .await?
            .try_get("total")?;
        Ok(total)
    }
}

fn duplicate_ip(ip: &str) -> IpamError {
    IpamError::Conflict(format!("IP address {} already exists", ip))
}

fn push_ip_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &IpFilter) {
    builder.push(" WHERE deleted_at IS NULL");

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = db::like_pattern(search);
        builder.push(" AND (ip LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR label LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR comment LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }

    if let Some(ip_type) = filter.ip_type {
        builder.push(" AND type = ");
        builder.push_bind(ip_type.as_str());
    }
}

async fn fetch_live(conn: &mut SqliteConnection, id: i64) -> IpamResult<IpAddressRecord> {
    let row = sqlx::query("SELECT * FROM ip_addresses WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| IpamError::NotFound(format!("IP address {} not found", id)))?;

    IpAddressRecord::from_row(&row)
}

async fn live_ip_taken(
    conn: &mut SqliteConnection,
    ip: &str,
    except_id: Option<i64>,
) -> IpamResult<bool> {
    let row = sqlx::query(
        "SELECT id FROM ip_addresses WHERE ip = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR id <> ?2)",
    )
    .bind(ip)
    .bind(except_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.is_some())
}
