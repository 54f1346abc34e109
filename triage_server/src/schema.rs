//! Diesel table definitions for the triage server.
//!
//! Tables: triage_deliveries, triage_rules, triage_alerts,
//! triage_action_failures, triage_audit_log, triage_delivery_metrics,
//! triage_users.

diesel::table! {
    triage_deliveries (id) {
        id -> Int8,
        delivery_id -> Varchar,
        event_type -> Varchar,
        action -> Varchar,
        repository_full_name -> Varchar,
        sender_login -> Varchar,
        raw_payload -> Jsonb,
        received_at -> Timestamptz,
    }
}

diesel::table! {
    triage_rules (id) {
        id -> Int8,
        event_type -> Varchar,
        keyword -> Varchar,
        suggestion_type -> Varchar,
        suggestion_value -> Text,
        reason -> Text,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    triage_alerts (id) {
        id -> Int8,
        delivery_id -> Varchar,
        event_type -> Varchar,
        action -> Varchar,
        repository_full_name -> Varchar,
        sender_login -> Varchar,
        rule_matched -> Varchar,
        suggestion_type -> Varchar,
        suggestion_value -> Text,
        reason -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    triage_action_failures (id) {
        id -> Int8,
        delivery_id -> Varchar,
        event_type -> Varchar,
        action -> Varchar,
        repository_full_name -> Varchar,
        suggestion_type -> Varchar,
        suggestion_value -> Text,
        error_message -> Text,
        attempt_count -> Int4,
        retry_count -> Int4,
        last_retry_status -> Varchar,
        last_retry_message -> Nullable<Text>,
        last_retry_at -> Nullable<Timestamptz>,
        is_resolved -> Bool,
        occurred_at -> Timestamptz,
    }
}

diesel::table! {
    triage_audit_log (id) {
        id -> Int8,
        actor -> Varchar,
        action -> Varchar,
        target -> Varchar,
        target_id -> Nullable<Varchar>,
        payload -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    triage_delivery_metrics (id) {
        id -> Int8,
        event_type -> Varchar,
        delivery_id -> Varchar,
        success -> Bool,
        processing_ms -> Int8,
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    triage_users (id) {
        id -> Int8,
        username -> Varchar,
        password_hash -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
