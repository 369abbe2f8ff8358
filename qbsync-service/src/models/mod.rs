//! Domain models for qbsync-service.

pub mod invoice;
pub mod mapping;
pub mod qb;
pub mod validation;

pub use invoice::{
    LedgerInvoice, LedgerInvoiceStatus, LedgerLineItem, LedgerManager, LedgerOrganization,
    SkuUsage,
};
pub use mapping::{
    CustomerMapping, CustomerMatchMethod, MappingStatus, MatchFactors, NewCustomerMapping,
    NewSkuMapping, SkuMapping, SkuMappingStatus, SkuMatchMethod,
};
pub use qb::{
    QbAddress, QbCustomer, QbInvoice, QbInvoiceLine, QbItem, QbTaxLine, QbTxnTaxDetail,
};
pub use validation::{
    BlockingIssue, InvoiceValidation, IssueCode, IssueSeverity, MatchCandidate, MatchLogEntry,
    NewValidation, ValidationOutcome, ValidationStatus,
};
