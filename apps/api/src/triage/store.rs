//! Storage collaborator. One insert per confirmed record; profile tier is an upsert.
//! Tables are created by `db::create_pool`.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::record::{CvRecordRow, ProfileRow};
use crate::triage::records::ConfirmedRecord;

/// Inserts every record in one transaction and returns the new row ids in input order.
pub async fn insert_confirmed_records(
    pool: &PgPool,
    user_id: &str,
    records: &[ConfirmedRecord],
) -> Result<Vec<Uuid>> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(records.len());

    for record in records {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO cv_records
                (id, user_id, category, title, organization, date, level, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(record.category.as_str())
        .bind(&record.title)
        .bind(&record.organization)
        .bind(&record.date)
        .bind(&record.level)
        .bind(&record.details)
        .execute(&mut *tx)
        .await?;
        ids.push(id);
    }

    tx.commit().await?;
    info!("Stored {} confirmed records for {}", ids.len(), user_id);
    Ok(ids)
}

pub async fn list_records(pool: &PgPool, user_id: &str) -> Result<Vec<CvRecordRow>> {
    let rows = sqlx::query_as::<_, CvRecordRow>(
        "SELECT * FROM cv_records WHERE user_id = $1 ORDER BY created_at, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Overwrites the user's tier on conflict of the unique `user_id`.
pub async fn upsert_global_tier(pool: &PgPool, user_id: &str, tier: &str) -> Result<ProfileRow> {
    let row = sqlx::query_as::<_, ProfileRow>(
        r#"
        INSERT INTO profiles (user_id, global_tier, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (user_id)
        DO UPDATE SET global_tier = EXCLUDED.global_tier, updated_at = now()
        RETURNING user_id, global_tier, updated_at
        "#,
    )
    .bind(user_id)
    .bind(tier)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_profile(pool: &PgPool, user_id: &str) -> Result<Option<ProfileRow>> {
    let row = sqlx::query_as::<_, ProfileRow>(
        "SELECT user_id, global_tier, updated_at FROM profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
