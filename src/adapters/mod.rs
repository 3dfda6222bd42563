pub mod api_errors;
pub mod catalog;
pub mod duitku;
pub mod midtrans;
pub mod purchases;
pub mod webhooks;
