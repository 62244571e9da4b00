//! Tender models for public procurement notices.
//!
//! `TenderFields` is the canonical shape produced by normalization. `Tender`
//! is the persisted entity: the same fields plus identity and bookkeeping
//! timestamps managed by the store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Canonical tender record, keyed by `tender_id`.
///
/// Every field except `tender_id` is overwritten on each upsert. Optional
/// fields that upstream stops sending become `None` rather than keeping a
/// previous value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderFields {
    /// Stable external identifier (`tenderId`, falling back to `moIdentifier`).
    pub tender_id: String,
    pub announcement_number: String,
    pub announcement_type: String,
    pub order_name: String,
    pub contracting_authority: String,
    pub description: String,
    pub authority_city: String,
    pub authority_region: String,
    /// Publication date. Defaults to the run date when upstream omits it.
    pub publication_date: NaiveDate,
    pub submission_deadline: Option<NaiveDate>,
    /// Link to the public notice page.
    pub details_url: String,
    pub client_type: Option<String>,
    pub order_type: Option<String>,
    pub tender_type: Option<String>,
    pub notice_type_ted: Option<String>,
    pub notice_type_display_name: Option<String>,
    pub bzp_number: Option<String>,
    pub is_tender_amount_below_eu: Option<bool>,
    pub cpv_code: Option<String>,
    pub procedure_result: Option<String>,
    pub authority_country: Option<String>,
    pub authority_national_id: Option<String>,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub mo_identifier: Option<String>,
    pub is_manually_linked_with_tender: Option<bool>,
    pub html_body: Option<String>,
    /// Opaque contractor payload, stored exactly as received.
    pub contractors: Option<serde_json::Value>,
    pub bzp_tender_plan_number: Option<String>,
    pub base_notice_mo_identifier: Option<String>,
    pub technical_notice_mo_identifier: Option<String>,
    /// Upstream staleness marker. Passed through, never triggers deletion.
    pub outdated: Option<bool>,
    pub object_id: Option<String>,
    pub pdf_url: Option<String>,
}

impl TenderFields {
    /// Create a record with only the required fields set.
    pub fn new(tender_id: impl Into<String>, publication_date: NaiveDate) -> Self {
        Self {
            tender_id: tender_id.into(),
            announcement_number: String::new(),
            announcement_type: String::new(),
            order_name: String::new(),
            contracting_authority: String::new(),
            description: String::new(),
            authority_city: String::new(),
            authority_region: String::new(),
            publication_date,
            submission_deadline: None,
            details_url: String::new(),
            client_type: None,
            order_type: None,
            tender_type: None,
            notice_type_ted: None,
            notice_type_display_name: None,
            bzp_number: None,
            is_tender_amount_below_eu: None,
            cpv_code: None,
            procedure_result: None,
            authority_country: None,
            authority_national_id: None,
            user_id: None,
            organization_id: None,
            mo_identifier: None,
            is_manually_linked_with_tender: None,
            html_body: None,
            contractors: None,
            bzp_tender_plan_number: None,
            base_notice_mo_identifier: None,
            technical_notice_mo_identifier: None,
            outdated: None,
            object_id: None,
            pdf_url: None,
        }
    }
}

/// A persisted tender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    /// Row identity, assigned on first insert and never changed.
    pub uuid: String,
    #[serde(flatten)]
    pub fields: TenderFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tender {
    pub fn tender_id(&self) -> &str {
        &self.fields.tender_id
    }
}

/// Result of an upsert: the stored entity and whether it was newly created.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub tender: Tender,
    pub created: bool,
}

/// Sortable columns for listing tenders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenderOrderField {
    #[default]
    PublicationDate,
    SubmissionDeadline,
    CreatedAt,
}

/// Sort order, e.g. `-publication_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenderOrdering {
    pub field: TenderOrderField,
    pub descending: bool,
}

impl Default for TenderOrdering {
    fn default() -> Self {
        Self {
            field: TenderOrderField::PublicationDate,
            descending: true,
        }
    }
}

impl TenderOrdering {
    /// Parse `field` or `-field`.
    pub fn parse(s: &str) -> Option<Self> {
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match name {
            "publication_date" => TenderOrderField::PublicationDate,
            "submission_deadline" => TenderOrderField::SubmissionDeadline,
            "created_at" => TenderOrderField::CreatedAt,
            _ => return None,
        };
        Some(Self { field, descending })
    }
}

/// Filters for listing stored tenders.
#[derive(Debug, Clone)]
pub struct TenderQuery {
    /// Case-insensitive substring matched against id, name, description and authority.
    pub search: Option<String>,
    pub ordering: TenderOrdering,
    pub limit: i64,
}

impl Default for TenderQuery {
    fn default() -> Self {
        Self {
            search: None,
            ordering: TenderOrdering::default(),
            limit: 50,
        }
    }
}
