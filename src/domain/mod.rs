pub mod access;
pub mod audit;
pub mod catalog;
pub mod error;
pub mod gateway;
pub mod id;
pub mod item;
pub mod payment;
pub mod status;
