//! Diesel ORM models for the `tenders` table.

use diesel::prelude::*;

use crate::models::TenderFields;
use crate::schema;

/// Tender row as stored.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::tenders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TenderRecord {
    pub uuid: String,
    pub tender_id: String,
    pub announcement_number: String,
    pub announcement_type: String,
    pub order_name: String,
    pub contracting_authority: String,
    pub description: String,
    pub authority_city: String,
    pub authority_region: String,
    pub publication_date: String,
    pub submission_deadline: Option<String>,
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
    pub contractors: Option<String>,
    pub bzp_tender_plan_number: Option<String>,
    pub base_notice_mo_identifier: Option<String>,
    pub technical_notice_mo_identifier: Option<String>,
    pub outdated: Option<bool>,
    pub object_id: Option<String>,
    pub pdf_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Every overwritable column of a tender.
///
/// `treat_none_as_null` makes an update a full replace: an optional that is
/// `None` now clears whatever was stored before.
#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::tenders)]
#[diesel(treat_none_as_null = true)]
pub struct TenderColumns<'a> {
    pub announcement_number: &'a str,
    pub announcement_type: &'a str,
    pub order_name: &'a str,
    pub contracting_authority: &'a str,
    pub description: &'a str,
    pub authority_city: &'a str,
    pub authority_region: &'a str,
    pub publication_date: &'a str,
    pub submission_deadline: Option<&'a str>,
    pub details_url: &'a str,
    pub client_type: Option<&'a str>,
    pub order_type: Option<&'a str>,
    pub tender_type: Option<&'a str>,
    pub notice_type_ted: Option<&'a str>,
    pub notice_type_display_name: Option<&'a str>,
    pub bzp_number: Option<&'a str>,
    pub is_tender_amount_below_eu: Option<bool>,
    pub cpv_code: Option<&'a str>,
    pub procedure_result: Option<&'a str>,
    pub authority_country: Option<&'a str>,
    pub authority_national_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub organization_id: Option<&'a str>,
    pub mo_identifier: Option<&'a str>,
    pub is_manually_linked_with_tender: Option<bool>,
    pub html_body: Option<&'a str>,
    pub contractors: Option<&'a str>,
    pub bzp_tender_plan_number: Option<&'a str>,
    pub base_notice_mo_identifier: Option<&'a str>,
    pub technical_notice_mo_identifier: Option<&'a str>,
    pub outdated: Option<bool>,
    pub object_id: Option<&'a str>,
    pub pdf_url: Option<&'a str>,
    pub updated_at: &'a str,
}

impl<'a> TenderColumns<'a> {
    /// Borrow column values from canonical fields.
    ///
    /// Values that need encoding (dates, contractor JSON, the write
    /// timestamp) are passed in already formatted.
    pub fn new(
        fields: &'a TenderFields,
        publication_date: &'a str,
        submission_deadline: Option<&'a str>,
        contractors: Option<&'a str>,
        updated_at: &'a str,
    ) -> Self {
        Self {
            announcement_number: &fields.announcement_number,
            announcement_type: &fields.announcement_type,
            order_name: &fields.order_name,
            contracting_authority: &fields.contracting_authority,
            description: &fields.description,
            authority_city: &fields.authority_city,
            authority_region: &fields.authority_region,
            publication_date,
            submission_deadline,
            details_url: &fields.details_url,
            client_type: fields.client_type.as_deref(),
            order_type: fields.order_type.as_deref(),
            tender_type: fields.tender_type.as_deref(),
            notice_type_ted: fields.notice_type_ted.as_deref(),
            notice_type_display_name: fields.notice_type_display_name.as_deref(),
            bzp_number: fields.bzp_number.as_deref(),
            is_tender_amount_below_eu: fields.is_tender_amount_below_eu,
            cpv_code: fields.cpv_code.as_deref(),
            procedure_result: fields.procedure_result.as_deref(),
            authority_country: fields.authority_country.as_deref(),
            authority_national_id: fields.authority_national_id.as_deref(),
            user_id: fields.user_id.as_deref(),
            organization_id: fields.organization_id.as_deref(),
            mo_identifier: fields.mo_identifier.as_deref(),
            is_manually_linked_with_tender: fields.is_manually_linked_with_tender,
            html_body: fields.html_body.as_deref(),
            contractors,
            bzp_tender_plan_number: fields.bzp_tender_plan_number.as_deref(),
            base_notice_mo_identifier: fields.base_notice_mo_identifier.as_deref(),
            technical_notice_mo_identifier: fields.technical_notice_mo_identifier.as_deref(),
            outdated: fields.outdated,
            object_id: fields.object_id.as_deref(),
            pdf_url: fields.pdf_url.as_deref(),
            updated_at,
        }
    }
}

/// New tender for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::tenders)]
pub struct NewTender<'a> {
    pub uuid: &'a str,
    pub tender_id: &'a str,
    pub created_at: &'a str,
    #[diesel(embed)]
    pub columns: TenderColumns<'a>,
}
