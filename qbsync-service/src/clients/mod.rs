pub mod ledger;
pub mod quickbooks;

pub use ledger::{HttpLedgerConnector, LedgerConnector};
pub use quickbooks::{QboClient, QuickBooks};
