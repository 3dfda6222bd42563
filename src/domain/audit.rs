use uuid::Uuid;

pub struct NewAuditEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub merchant_order_id: Option<String>,
    pub action: String,
    pub actor: String,
    pub detail: serde_json::Value,
}

impl NewAuditEntry {
    pub fn payment(entity_id: Uuid, order_id: &str, action: &str, actor: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type: "payment".to_string(),
            entity_id: Some(entity_id),
            merchant_order_id: Some(order_id.to_string()),
            action: action.to_string(),
            actor: actor.to_string(),
            detail: serde_json::json!({}),
        }
    }
}
