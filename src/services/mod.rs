pub mod access_grant;
pub mod purchase;
pub mod reconciliation;
pub mod sweeper;
