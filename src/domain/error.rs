use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("gateway unreachable: {0}")]
    GatewayUnreachable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("item already owned by this user")]
    AlreadyOwned,

    #[error("access grant failed after completed payment: {0}")]
    AccessGrant(String),
}
