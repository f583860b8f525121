use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

/// Catalog entry as read from the content service's tables. The engine never
/// writes to "words"; authoring lives upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub id: String,
    pub category_id: String,
    pub script: String,
    pub romaji: String,
    pub translation: String,
    pub difficulty_level: i32,
    pub frequency_rank: Option<i32>,
    pub is_active: bool,
}

pub async fn get_word(pool: &PgPool, word_id: &str) -> Result<Option<Word>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "categoryId", "script", "romaji", "translation",
               "difficultyLevel", "frequencyRank", "isActive"
        FROM "words"
        WHERE "id" = $1
        LIMIT 1
        "#,
    )
    .bind(word_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_word(&r)))
}

pub(crate) fn map_word(row: &sqlx::postgres::PgRow) -> Word {
    Word {
        id: row.try_get("id").unwrap_or_default(),
        category_id: row.try_get("categoryId").unwrap_or_default(),
        script: row.try_get("script").unwrap_or_default(),
        romaji: row.try_get("romaji").unwrap_or_default(),
        translation: row.try_get("translation").unwrap_or_default(),
        difficulty_level: row.try_get("difficultyLevel").unwrap_or(1),
        frequency_rank: row.try_get::<Option<i32>, _>("frequencyRank").ok().flatten(),
        is_active: row.try_get("isActive").unwrap_or(false),
    }
}
