//! triage.user: operator account for the admin API.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::schema::triage_users;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = triage_users)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = triage_users)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
}
