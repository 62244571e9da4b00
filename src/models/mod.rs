//! Data models for tenderscout.

mod tender;

pub use tender::{
    Tender, TenderFields, TenderOrderField, TenderOrdering, TenderQuery, UpsertOutcome,
};
