//! Settings database operations
//!
//! Key-value accessors for the `settings` table. Provider API keys stored
//! here take priority over environment variables and the TOML file.

use cellar_common::{Error, Result};
use sqlx::{Pool, Sqlite};

pub const VISION_API_KEY_SETTING: &str = "vision_api_key";
pub const OPENAI_API_KEY_SETTING: &str = "openai_api_key";

/// Get Google Cloud Vision API key from database
pub async fn get_vision_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, VISION_API_KEY_SETTING).await
}

pub async fn set_vision_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, VISION_API_KEY_SETTING, key).await
}

/// Get OpenAI API key from database
pub async fn get_openai_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, OPENAI_API_KEY_SETTING).await
}

pub async fn set_openai_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, OPENAI_API_KEY_SETTING, key).await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
