use {crate::domain::audit::NewAuditEntry, crate::domain::error::PaymentError};

pub async fn insert_audit_entry(
    exec: impl sqlx::postgres::PgExecutor<'_>,
    entry: &NewAuditEntry,
) -> Result<(), PaymentError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, entity_type, entity_id, merchant_order_id, action, actor, detail)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.merchant_order_id.as_deref())
    .bind(&entry.action)
    .bind(&entry.actor)
    .bind(&entry.detail)
    .execute(exec)
    .await?;
    Ok(())
}
