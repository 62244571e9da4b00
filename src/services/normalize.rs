//! Mapping of raw search-API records onto `TenderFields`.
//!
//! Upstream guarantees nothing about record shape. Scalars are read
//! leniently (numbers and booleans where text is expected are rendered as
//! text); a value of the wrong structure, or a date that does not parse,
//! rejects the record.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::models::TenderFields;

/// Default prefix for public notice pages.
pub const DEFAULT_DETAILS_BASE_URL: &str =
    "https://ezamowienia.gov.pl/mo-client-board/bzp/notice-details/";

/// Why a record was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Invalid date in {field}: {value}")]
    InvalidDate { field: &'static str, value: String },

    #[error("Invalid value in {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Converts raw records to canonical tender fields.
#[derive(Debug, Clone)]
pub struct Normalizer {
    details_base_url: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_DETAILS_BASE_URL)
    }
}

impl Normalizer {
    pub fn new(details_base_url: impl Into<String>) -> Self {
        Self {
            details_base_url: details_base_url.into(),
        }
    }

    /// Normalize one record.
    ///
    /// Returns `Ok(None)` when the record has neither `tenderId` nor
    /// `moIdentifier`. `today` fills in a missing publication date.
    pub fn normalize(
        &self,
        raw: &Value,
        today: NaiveDate,
    ) -> Result<Option<TenderFields>, NormalizeError> {
        let record = raw.as_object().ok_or(NormalizeError::NotAnObject)?;
        let r = Reader(record);

        let mo_identifier = r.text("moIdentifier")?.filter(|s| !s.is_empty());
        let tender_id = match r.text("tenderId")?.filter(|s| !s.is_empty()) {
            Some(id) => id,
            None => match mo_identifier.clone() {
                Some(id) => id,
                None => {
                    debug!("Skipping record without tenderId or moIdentifier");
                    return Ok(None);
                }
            },
        };

        let publication_date = match r.date("publicationDate")? {
            Some(date) => date,
            None => {
                debug!("Tender {} has no publication date, using {}", tender_id, today);
                today
            }
        };

        let details_url = format!(
            "{}{}",
            self.details_base_url,
            mo_identifier.as_deref().unwrap_or(&tender_id)
        );
        let order_object = r.text_or_empty("orderObject")?;

        Ok(Some(TenderFields {
            announcement_number: r.text_or_empty("noticeNumber")?,
            announcement_type: r.text_or_empty("noticeType")?,
            order_name: order_object.clone(),
            contracting_authority: r.text_or_empty("organizationName")?,
            description: order_object,
            authority_city: r.text_or_empty("organizationCity")?,
            authority_region: r.text_or_empty("organizationProvince")?,
            publication_date,
            submission_deadline: r.date("submittingOffersDate")?,
            details_url,
            client_type: r.text("clientType")?,
            order_type: r.text("orderType")?,
            tender_type: r.text("tenderType")?,
            notice_type_ted: r.text("noticeTypeTed")?,
            notice_type_display_name: r.text("noticeTypeDisplayName")?,
            bzp_number: r.text("bzpNumber")?,
            is_tender_amount_below_eu: r.flag("isTenderAmountBelowEU")?,
            cpv_code: r.text("cpvCode")?,
            procedure_result: r.text("procedureResult")?,
            authority_country: r.text("organizationCountry")?,
            authority_national_id: r.text("organizationNationalId")?,
            user_id: r.text("userId")?,
            organization_id: r.text("organizationId")?,
            mo_identifier,
            is_manually_linked_with_tender: r.flag("isManuallyLinkedWithTender")?,
            html_body: r.text("htmlBody")?,
            contractors: record.get("contractors").filter(|v| !v.is_null()).cloned(),
            bzp_tender_plan_number: r.text("bzpTenderPlanNumber")?,
            base_notice_mo_identifier: r.text("baseNoticeMOIdentifier")?,
            technical_notice_mo_identifier: r.text("technicalNoticeMOIdentifier")?,
            outdated: r.flag("outdated")?,
            object_id: r.text("objectId")?,
            pdf_url: r.text("pdfUrl")?,
            tender_id,
        }))
    }
}

/// Typed accessors over one raw record.
struct Reader<'a>(&'a Map<String, Value>);

impl Reader<'_> {
    fn text(&self, field: &'static str) -> Result<Option<String>, NormalizeError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(NormalizeError::InvalidField {
                field,
                reason: format!("expected text, got {}", kind(other)),
            }),
        }
    }

    fn text_or_empty(&self, field: &'static str) -> Result<String, NormalizeError> {
        Ok(self.text(field)?.unwrap_or_default())
    }

    fn flag(&self, field: &'static str) -> Result<Option<bool>, NormalizeError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(other) => Err(NormalizeError::InvalidField {
                field,
                reason: format!("expected boolean, got {}", other),
            }),
        }
    }

    /// Absent, null and empty string all mean "no date".
    fn date(&self, field: &'static str) -> Result<Option<NaiveDate>, NormalizeError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => parse_date(s).map(Some).ok_or(NormalizeError::InvalidDate {
                field,
                value: s.clone(),
            }),
            Some(other) => Err(NormalizeError::InvalidDate {
                field,
                value: other.to_string(),
            }),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse an ISO-8601 date or timestamp into a calendar date.
///
/// Timestamps with an offset yield the date in that offset, not in the
/// local time zone.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
