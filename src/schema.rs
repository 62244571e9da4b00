// Kept in sync by hand with the DDL in repository::diesel_context.

diesel::table! {
    tenders (uuid) {
        uuid -> Text,
        tender_id -> Text,
        announcement_number -> Text,
        announcement_type -> Text,
        order_name -> Text,
        contracting_authority -> Text,
        description -> Text,
        authority_city -> Text,
        authority_region -> Text,
        publication_date -> Text,
        submission_deadline -> Nullable<Text>,
        details_url -> Text,
        client_type -> Nullable<Text>,
        order_type -> Nullable<Text>,
        tender_type -> Nullable<Text>,
        notice_type_ted -> Nullable<Text>,
        notice_type_display_name -> Nullable<Text>,
        bzp_number -> Nullable<Text>,
        is_tender_amount_below_eu -> Nullable<Bool>,
        cpv_code -> Nullable<Text>,
        procedure_result -> Nullable<Text>,
        authority_country -> Nullable<Text>,
        authority_national_id -> Nullable<Text>,
        user_id -> Nullable<Text>,
        organization_id -> Nullable<Text>,
        mo_identifier -> Nullable<Text>,
        is_manually_linked_with_tender -> Nullable<Bool>,
        html_body -> Nullable<Text>,
        contractors -> Nullable<Text>,
        bzp_tender_plan_number -> Nullable<Text>,
        base_notice_mo_identifier -> Nullable<Text>,
        technical_notice_mo_identifier -> Nullable<Text>,
        outdated -> Nullable<Bool>,
        object_id -> Nullable<Text>,
        pdf_url -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}
