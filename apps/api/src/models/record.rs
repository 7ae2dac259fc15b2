use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::triage::models::Category;
use crate::triage::records::ConfirmedRecord;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CvRecordRow {
    pub id: Uuid,
    pub user_id: String,
    pub category: String,
    pub title: String,
    pub organization: String,
    pub date: String,
    pub level: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl From<CvRecordRow> for ConfirmedRecord {
    fn from(row: CvRecordRow) -> Self {
        Self {
            category: Category::from_label(&row.category).unwrap_or(Category::Fragment),
            title: row.title,
            organization: row.organization,
            date: row.date,
            level: row.level,
            details: row.details,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfileRow {
    pub user_id: String,
    pub global_tier: String,
    pub updated_at: DateTime<Utc>,
}
