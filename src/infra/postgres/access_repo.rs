use {
    crate::domain::{
        access::AccessGrant,
        error::PaymentError,
        item::{ItemKind, ItemRef},
    },
    chrono::{DateTime, Utc},
    sqlx::postgres::PgExecutor,
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct GrantRow {
    id: Uuid,
    user_id: i64,
    item_type: String,
    item_id: i64,
    granted_via: Option<Uuid>,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<GrantRow> for AccessGrant {
    type Error = PaymentError;

    fn try_from(row: GrantRow) -> Result<Self, Self::Error> {
        Ok(AccessGrant {
            id: row.id,
            user_id: row.user_id,
            item: ItemRef::new(ItemKind::try_from(row.item_type.as_str())?, row.item_id),
            granted_via: row.granted_via,
            granted_at: row.granted_at,
            expires_at: row.expires_at,
        })
    }
}

pub async fn find(
    exec: impl PgExecutor<'_>,
    user_id: i64,
    item: ItemRef,
) -> Result<Option<AccessGrant>, PaymentError> {
    let row = sqlx::query_as::<_, GrantRow>(
        r#"
        SELECT id, user_id, item_type, item_id, granted_via, granted_at, expires_at
        FROM access_grants
        WHERE user_id = $1 AND item_type = $2 AND item_id = $3
        "#,
    )
    .bind(user_id)
    .bind(item.kind.as_str())
    .bind(item.item_id)
    .fetch_optional(exec)
    .await?;

    row.map(AccessGrant::try_from).transpose()
}

pub async fn insert(
    exec: impl PgExecutor<'_>,
    user_id: i64,
    item: ItemRef,
    granted_via: Uuid,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), PaymentError> {
    sqlx::query(
        r#"
        INSERT INTO access_grants
            (id, user_id, item_type, item_id, granted_via, granted_at, expires_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, now())
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(item.kind.as_str())
    .bind(item.item_id)
    .bind(granted_via)
    .bind(granted_at)
    .bind(expires_at)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn refresh(
    exec: impl PgExecutor<'_>,
    id: Uuid,
    granted_via: Uuid,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), PaymentError> {
    sqlx::query(
        r#"
        UPDATE access_grants
        SET granted_via = $2, granted_at = $3, expires_at = $4, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(granted_via)
    .bind(granted_at)
    .bind(expires_at)
    .execute(exec)
    .await?;
    Ok(())
}
