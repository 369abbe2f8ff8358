//! HTTP handlers for qbsync-service.

pub mod customers;
pub mod skus;
pub mod sync;
pub mod validations;
