pub mod address;
pub mod customer_matcher;
pub mod database;
pub mod fuzzy;
pub mod metrics;
pub mod sku_matcher;
pub mod store;
pub mod sync;
pub mod tax;
pub mod validator;

pub use customer_matcher::CustomerMatcher;
pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use sku_matcher::SkuMatcher;
pub use store::SyncStore;
pub use sync::SyncEngine;
pub use tax::TaxConfig;
pub use validator::InvoiceValidator;
