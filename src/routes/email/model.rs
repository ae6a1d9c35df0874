use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct WelcomeProfile {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub welcome_email_sent: Option<bool>,
}

impl WelcomeProfile {
    pub async fn find(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT email, full_name, welcome_email_sent FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_sent(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE profiles SET welcome_email_sent = true WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub queued: bool,
}
