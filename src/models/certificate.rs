// src/models/certificate.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'certificates' table in the database.
///
/// At most one certificate per (account, course), enforced by a unique
/// constraint. Rendering of the printable artifact is delegated to an
/// external renderer that consumes this record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,

    /// Globally unique certificate number, e.g. "NCC-2026-3F9A21B0".
    pub certificate_number: String,

    pub account_id: i64,

    pub course_id: i64,

    pub issued_at: chrono::DateTime<chrono::Utc>,
}
