use chrono::{DateTime, Utc};
use epdb_core::CityImage;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `city_images` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CityImageRow {
    pub id: i64,
    pub city: String,
    pub image_link: String,
    pub is_main_image: bool,
    pub video_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CityImageRow> for CityImage {
    fn from(row: CityImageRow) -> Self {
        CityImage {
            city: row.city,
            image_link: row.image_link,
            is_main_image: row.is_main_image,
            video_url: row.video_url,
        }
    }
}

/// The full city media catalog, main images first within each city.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_city_images(pool: &PgPool) -> Result<Vec<CityImage>, DbError> {
    let rows = sqlx::query_as::<_, CityImageRow>(
        "SELECT id, city, image_link, is_main_image, video_url, created_at \
         FROM city_images \
         ORDER BY city, is_main_image DESC, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(CityImage::from).collect())
}
