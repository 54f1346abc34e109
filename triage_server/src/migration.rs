//! Startup migration for the triage tables.

use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// SQL migration for all triage tables. Safe to run on every start.
pub const MIGRATION_SQL: &str = r#"
-- ================================================================
-- Webhook triage tables
-- ================================================================

CREATE TABLE IF NOT EXISTS triage_deliveries (
    id                    BIGSERIAL PRIMARY KEY,
    delivery_id           VARCHAR(128) NOT NULL UNIQUE,
    event_type            VARCHAR(64) NOT NULL,
    action                VARCHAR(64) NOT NULL DEFAULT '',
    repository_full_name  VARCHAR(255) NOT NULL DEFAULT '',
    sender_login          VARCHAR(255) NOT NULL DEFAULT '',
    raw_payload           JSONB NOT NULL,
    received_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_triage_deliveries_received ON triage_deliveries (received_at DESC);

CREATE TABLE IF NOT EXISTS triage_rules (
    id                BIGSERIAL PRIMARY KEY,
    event_type        VARCHAR(64) NOT NULL DEFAULT '',
    keyword           VARCHAR(255) NOT NULL,
    suggestion_type   VARCHAR(16) NOT NULL,
    suggestion_value  TEXT NOT NULL,
    reason            TEXT NOT NULL DEFAULT '',
    is_active         BOOLEAN NOT NULL DEFAULT TRUE,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (event_type, keyword, suggestion_type, suggestion_value)
);

CREATE TABLE IF NOT EXISTS triage_alerts (
    id                    BIGSERIAL PRIMARY KEY,
    delivery_id           VARCHAR(128) NOT NULL,
    event_type            VARCHAR(64) NOT NULL,
    action                VARCHAR(64) NOT NULL DEFAULT '',
    repository_full_name  VARCHAR(255) NOT NULL DEFAULT '',
    sender_login          VARCHAR(255) NOT NULL DEFAULT '',
    rule_matched          VARCHAR(255) NOT NULL,
    suggestion_type       VARCHAR(16) NOT NULL,
    suggestion_value      TEXT NOT NULL,
    reason                TEXT NOT NULL DEFAULT '',
    created_at            TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (delivery_id, suggestion_type, suggestion_value, rule_matched)
);

CREATE INDEX IF NOT EXISTS idx_triage_alerts_created ON triage_alerts (created_at DESC);

CREATE TABLE IF NOT EXISTS triage_action_failures (
    id                    BIGSERIAL PRIMARY KEY,
    delivery_id           VARCHAR(128) NOT NULL,
    event_type            VARCHAR(64) NOT NULL,
    action                VARCHAR(64) NOT NULL DEFAULT '',
    repository_full_name  VARCHAR(255) NOT NULL DEFAULT '',
    suggestion_type       VARCHAR(16) NOT NULL,
    suggestion_value      TEXT NOT NULL,
    error_message         TEXT NOT NULL,
    attempt_count         INTEGER NOT NULL CHECK (attempt_count >= 1),
    retry_count           INTEGER NOT NULL DEFAULT 0,
    last_retry_status     VARCHAR(16) NOT NULL DEFAULT 'never',
    last_retry_message    TEXT,
    last_retry_at         TIMESTAMPTZ,
    is_resolved           BOOLEAN NOT NULL DEFAULT FALSE,
    occurred_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_triage_failures_occurred ON triage_action_failures (occurred_at DESC);

CREATE TABLE IF NOT EXISTS triage_audit_log (
    id          BIGSERIAL PRIMARY KEY,
    actor       VARCHAR(255) NOT NULL,
    action      VARCHAR(64) NOT NULL,
    target      VARCHAR(64) NOT NULL,
    target_id   VARCHAR(128),
    payload     JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS triage_delivery_metrics (
    id             BIGSERIAL PRIMARY KEY,
    event_type     VARCHAR(64) NOT NULL,
    delivery_id    VARCHAR(128) NOT NULL,
    success        BOOLEAN NOT NULL,
    processing_ms  BIGINT NOT NULL,
    recorded_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_triage_metrics_recorded ON triage_delivery_metrics (recorded_at DESC);

CREATE TABLE IF NOT EXISTS triage_users (
    id             BIGSERIAL PRIMARY KEY,
    username       VARCHAR(255) NOT NULL UNIQUE,
    password_hash  VARCHAR(255) NOT NULL,
    is_active      BOOLEAN NOT NULL DEFAULT TRUE,
    created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Run the triage migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("triage migration failed: {e}"))?;
    Ok(())
}
