/// Audit ledger storage and queries
use crate::{
    access::{ActorContext, AuditVisibility},
    audit::{
        AuditActor, AuditEntry, AuditEvent, AuditFilter, AuditRecord, EventOption, Values,
    },
    db::{self, Page, PageRequest},
    error::{IpamError, IpamResult},
    metrics,
};
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, types::Json, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, error};

const ENTRY_COLUMNS: &str = r#"
    a.id, a.user_id, a.session_id, a.event, a.auditable_type, a.auditable_id,
    a.old_values, a.new_values, a.description, a.user_ip, a.user_agent, a.created_at,
    u.name AS actor_name
"#;

/// Append-only audit ledger
#[derive(Clone)]
pub struct AuditLedger {
    db: SqlitePool,
}

impl AuditLedger {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append an entry
    pub async fn record(&self, record: AuditRecord) -> IpamResult<AuditEntry> {
        let now = Utc::now();
        let description = record
            .description
            .clone()
            .unwrap_or_else(|| record.event.description().to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (
                user_id, session_id, event, auditable_type, auditable_id,
                old_values, new_values, description, user_ip, user_agent, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.user_id)
        .bind(&record.session_id)
        .bind(record.event.as_str())
        .bind(record.entity.map(|e| e.kind.as_str()))
        .bind(record.entity.map(|e| e.id))
        .bind(record.old_values.clone().map(|v| Json(Value::Object(v))))
        .bind(record.new_values.clone().map(|v| Json(Value::Object(v))))
        .bind(&description)
        .bind(&record.client.ip)
        .bind(&record.client.user_agent)
        .bind(now)
        .execute(&self.db)
        .await?;

        metrics::record_audit_entry(record.event.as_str());
        debug!(event = record.event.as_str(), user_id = ?record.user_id, "Audit entry recorded");

        self.find(result.last_insert_rowid()).await
    }

    /// Append an entry after the business mutation has committed
    ///
    /// Failures are reported to operators and never reach the caller.
    pub async fn record_best_effort(&self, record: AuditRecord) -> Option<AuditEntry> {
        let event = record.event;
        match self.record(record).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                metrics::record_audit_failure(event.as_str());
                error!(event = event.as_str(), error = %e, "Failed to write audit entry");
                None
            }
        }
    }

    /// Fetch one entry by id
    pub async fn find(&self, id: i64) -> IpamResult<AuditEntry> {
        let sql = format!(
            "SELECT {} FROM audit_logs a LEFT JOIN users u ON u.id = a.user_id WHERE a.id = ?",
            ENTRY_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| IpamError::NotFound(format!("Audit entry {} not found", id)))?;

        entry_from_row(&row)
    }

    /// Filtered, newest-first page of entries visible to the actor
    pub async fn query(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
        actor: &ActorContext,
    ) -> IpamResult<Page<AuditEntry>> {
        let visibility = AuditVisibility::for_actor(actor);

        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(IpamError::validation(
                    "date_to",
                    "The end date must be on or after the start date.",
                ));
            }
        }

        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS total FROM audit_logs a LEFT JOIN users u ON u.id = a.user_id",
        );
        push_filters(&mut count, filter, visibility)?;
        let total: i64 = count.build().fetch_one(&self.db).await?.try_get("total")?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM audit_logs a LEFT JOIN users u ON u.id = a.user_id",
            ENTRY_COLUMNS
        ));
        push_filters(&mut select, filter, visibility)?;
        select.push(" ORDER BY a.created_at DESC, a.id DESC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let rows = select.build().fetch_all(&self.db).await?;
        let data = rows
            .iter()
            .map(entry_from_row)
            .collect::<IpamResult<Vec<_>>>()?;

        Ok(Page::new(data, page, total))
    }

    /// Event kinds the actor may filter on
    pub fn event_catalog(&self, actor: &ActorContext) -> Vec<EventOption> {
        let visibility = AuditVisibility::for_actor(actor);
        AuditEvent::all()
            .into_iter()
            .filter(|event| visibility.allows(*event))
            .map(|event| EventOption {
                value: event.as_str(),
                label: event.description(),
            })
            .collect()
    }

    /// Every entry about one entity, oldest first
    #[cfg(test)]
    pub(crate) async fn entries_for(
        &self,
        entity: crate::audit::EntityRef,
    ) -> IpamResult<Vec<AuditEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM audit_logs a LEFT JOIN users u ON u.id = a.user_id
            WHERE a.auditable_type = ? AND a.auditable_id = ?
            ORDER BY a.created_at ASC, a.id ASC
            "#,
            ENTRY_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(entity.kind.as_str())
            .bind(entity.id)
            .fetch_all(&self.db)
            .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    filter: &AuditFilter,
    visibility: AuditVisibility,
) -> IpamResult<()> {
    builder.push(" WHERE 1 = 1");

    let hidden = visibility.hidden_events();
    if !hidden.is_empty() {
        builder.push(" AND a.event NOT IN (");
        let mut separated = builder.separated(", ");
        for event in hidden {
            separated.push_bind(event.as_str());
        }
        separated.push_unseparated(")");
    }

    if let Some(event) = filter.event {
        builder.push(" AND a.event = ");
        builder.push_bind(event.as_str());
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = db::like_pattern(search);
        builder.push(" AND (a.description LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR u.name LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }

    if let Some(from) = filter.date_from {
        builder.push(" AND a.created_at >= ");
        builder.push_bind(start_of_day(from)?);
    }

    if let Some(to) = filter.date_to {
        let next = to
            .checked_add_days(Days::new(1))
            .ok_or_else(|| IpamError::validation("date_to", "The end date is out of range."))?;
        builder.push(" AND a.created_at < ");
        builder.push_bind(start_of_day(next)?);
    }

    Ok(())
}

fn start_of_day(date: NaiveDate) -> IpamResult<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .ok_or_else(|| IpamError::validation("date_from", "Invalid date."))
}

fn values_from_column(row: &SqliteRow, column: &str) -> IpamResult<Option<Values>> {
    let raw: Option<Json<Value>> = row.try_get(column)?;
    Ok(raw.and_then(|Json(value)| match value {
        Value::Object(map) => Some(map),
        _ => None,
    }))
}

fn entry_from_row(row: &SqliteRow) -> IpamResult<AuditEntry> {
    let event: String = row.try_get("event")?;
    let user_id: Option<i64> = row.try_get("user_id")?;
    let actor_name: Option<String> = row.try_get("actor_name")?;

    Ok(AuditEntry {
        id: row.try_get("id")?,
        user_id,
        session_id: row.try_get("session_id")?,
        event: AuditEvent::from_str(&event)?,
        auditable_type: row.try_get("auditable_type")?,
        auditable_id: row.try_get("auditable_id")?,
        old_values: values_from_column(row, "old_values")?,
        new_values: values_from_column(row, "new_values")?,
        description: row.try_get("description")?,
        user_ip: row.try_get("user_ip")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
        user: match (user_id, actor_name) {
            (Some(id), Some(name)) => Some(AuditActor { id, name }),
            _ => None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{actor::testing::actor, ClientMeta, RoleName};
    use crate::audit::EntityRef;
    use serde_json::json;

    async fn ledger() -> AuditLedger {
        AuditLedger::new(db::memory_pool().await.unwrap())
    }

    async fn insert_user(ledger: &AuditLedger, name: &str) -> i64 {
        sqlx::query(
            "INSERT INTO users (name, email, password_hash, status, created_at, updated_at) VALUES (?, ?, 'x', 'active', ?, ?)",
        )
        .bind(name)
        .bind(format!("{}@example.com", name.to_lowercase()))
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&ledger.db)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    fn object(value: Value) -> Values {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_record_persists_full_shape() {
        let ledger = ledger().await;
        let user_id = insert_user(&ledger, "Alice").await;

        let entry = ledger
            .record(
                AuditRecord::new(AuditEvent::UserStatusChanged)
                    .user_id(user_id)
                    .session("sid-9")
                    .client(ClientMeta {
                        ip: Some("192.0.2.1".to_string()),
                        user_agent: Some("curl/8".to_string()),
                    })
                    .on(EntityRef::user(user_id))
                    .old_values(object(json!({"status": "pending"})))
                    .new_values(object(json!({"status": "active"}))),
            )
            .await
            .unwrap();

        assert_eq!(entry.event, AuditEvent::UserStatusChanged);
        assert_eq!(entry.description, "User status changed");
        assert_eq!(entry.auditable_type.as_deref(), Some("User"));
        assert_eq!(entry.entity(), Some(EntityRef::user(user_id)));
        assert_eq!(entry.old_values.unwrap()["status"], json!("pending"));
        assert_eq!(entry.new_values.unwrap()["status"], json!("active"));
        assert_eq!(entry.user_ip.as_deref(), Some("192.0.2.1"));
        assert_eq!(entry.session_id.as_deref(), Some("sid-9"));
        assert_eq!(entry.user.unwrap().name, "Alice");
    }

    #[tokio::test]
    async fn test_system_entry_without_actor() {
        let ledger = ledger().await;
        let entry = ledger
            .record(AuditRecord::new(AuditEvent::LoginFailed).describe("Failed login attempt for 'x@example.com'"))
            .await
            .unwrap();

        assert!(entry.user_id.is_none());
        assert!(entry.user.is_none());
        assert!(entry.entity().is_none());
        assert!(entry.old_values.is_none());
    }

    #[tokio::test]
    async fn test_restricted_events_hidden_from_non_developers() {
        let ledger = ledger().await;
        ledger.record(AuditRecord::new(AuditEvent::UserCreated)).await.unwrap();
        ledger.record(AuditRecord::new(AuditEvent::UserRoleAssigned)).await.unwrap();
        ledger.record(AuditRecord::new(AuditEvent::PermissionCreated)).await.unwrap();

        let super_admin = actor(1, &[RoleName::SuperAdmin], &[]);
        let page = ledger
            .query(&AuditFilter::default(), PageRequest::default(), &super_admin)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.data.iter().all(|e| !e.event.is_restricted()));

        // Asking for a restricted kind directly still returns nothing
        let filter = AuditFilter {
            event: Some(AuditEvent::UserRoleAssigned),
            ..Default::default()
        };
        let page = ledger.query(&filter, PageRequest::default(), &super_admin).await.unwrap();
        assert_eq!(page.total, 0);

        let developer = actor(2, &[RoleName::Developer], &[]);
        let page = ledger
            .query(&AuditFilter::default(), PageRequest::default(), &developer)
            .await
            .unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_newest_first_and_pagination() {
        let ledger = ledger().await;
        for i in 0..12 {
            ledger
                .record(AuditRecord::new(AuditEvent::IpCreated).describe(format!("ip {}", i)))
                .await
                .unwrap();
        }

        let developer = actor(1, &[RoleName::Developer], &[]);
        let first = ledger
            .query(&AuditFilter::default(), PageRequest::default(), &developer)
            .await
            .unwrap();
        assert_eq!(first.total, 12);
        assert_eq!(first.last_page, 2);
        assert_eq!(first.data.len(), 10);
        assert_eq!(first.data[0].description, "ip 11");

        let second = ledger
            .query(&AuditFilter::default(), PageRequest { page: 2, per_page: 10 }, &developer)
            .await
            .unwrap();
        assert_eq!(second.data.len(), 2);
        assert_eq!(second.data[1].description, "ip 0");
    }

    #[tokio::test]
    async fn test_search_matches_description_or_actor_name() {
        let ledger = ledger().await;
        let bob = insert_user(&ledger, "Bob").await;

        ledger
            .record(AuditRecord::new(AuditEvent::IpCreated).describe("IP address '10.0.0.1' (core) created"))
            .await
            .unwrap();
        ledger
            .record(AuditRecord::new(AuditEvent::Logout).user_id(bob).describe("User 'Bob' logged out"))
            .await
            .unwrap();
        ledger
            .record(AuditRecord::new(AuditEvent::LoginSuccess).user_id(bob).describe("welcome"))
            .await
            .unwrap();

        let developer = actor(1, &[RoleName::Developer], &[]);

        let by_description = AuditFilter {
            search: Some("10.0.0".to_string()),
            ..Default::default()
        };
        let page = ledger.query(&by_description, PageRequest::default(), &developer).await.unwrap();
        assert_eq!(page.total, 1);

        let by_actor = AuditFilter {
            search: Some("bob".to_string()),
            ..Default::default()
        };
        let page = ledger.query(&by_actor, PageRequest::default(), &developer).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_date_range_is_inclusive() {
        let ledger = ledger().await;
        ledger.record(AuditRecord::new(AuditEvent::IpCreated)).await.unwrap();

        let developer = actor(1, &[RoleName::Developer], &[]);
        let today = Utc::now().date_naive();

        let same_day = AuditFilter {
            date_from: Some(today),
            date_to: Some(today),
            ..Default::default()
        };
        let page = ledger.query(&same_day, PageRequest::default(), &developer).await.unwrap();
        assert_eq!(page.total, 1);

        let tomorrow = today.succ_opt().unwrap();
        let future = AuditFilter {
            date_from: Some(tomorrow),
            ..Default::default()
        };
        let page = ledger.query(&future, PageRequest::default(), &developer).await.unwrap();
        assert_eq!(page.total, 0);

        let inverted = AuditFilter {
            date_from: Some(tomorrow),
            date_to: Some(today),
            ..Default::default()
        };
        assert!(matches!(
            ledger.query(&inverted, PageRequest::default(), &developer).await,
            Err(IpamError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_event_catalog_respects_restriction() {
        let ledger = ledger().await;

        let super_admin = actor(1, &[RoleName::SuperAdmin], &[]);
        let catalog = ledger.event_catalog(&super_admin);
        assert_eq!(catalog.len(), 11);
        assert!(catalog.iter().all(|o| o.value != "permission_created"));

        let developer = actor(2, &[RoleName::Developer], &[]);
        let catalog = ledger.event_catalog(&developer);
        assert_eq!(catalog.len(), 16);
        assert!(catalog.contains(&EventOption {
            value: "login_failed",
            label: "Failed login attempt",
        }));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let ledger = ledger().await;
        ledger.db.close().await;

        let entry = ledger
            .record_best_effort(AuditRecord::new(AuditEvent::Logout))
            .await;
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_entries_for_entity() {
        let ledger = ledger().await;
        ledger
            .record(AuditRecord::new(AuditEvent::IpCreated).on(EntityRef::ip_address(5)))
            .await
            .unwrap();
        ledger
            .record(AuditRecord::new(AuditEvent::IpDeleted).on(EntityRef::ip_address(5)))
            .await
            .unwrap();
        ledger
            .record(AuditRecord::new(AuditEvent::IpCreated).on(EntityRef::ip_address(6)))
            .await
            .unwrap();

        let history = ledger.entries_for(EntityRef::ip_address(5)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event, AuditEvent::IpCreated);
        assert_eq!(history[1].event, AuditEvent::IpDeleted);
    }
}
