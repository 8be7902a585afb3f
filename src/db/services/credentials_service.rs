use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, Set,
};

use crate::db::entities::evolution_credential;

pub async fn get_credentials(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Option<evolution_credential::Model>, DbErr> {
    evolution_credential::Entity::find_by_id(user_id).one(db).await
}

/// Inserts or replaces the user's gateway pair. The key must already be sealed.
pub async fn upsert_credentials(
    db: &DatabaseConnection,
    user_id: i32,
    api_url: &str,
    api_key_encrypted: &str,
) -> Result<evolution_credential::Model, DbErr> {
    let now = Utc::now();
    match get_credentials(db, user_id).await? {
        Some(existing) => {
            let mut active = existing.into_active_model();
            active.api_url = Set(api_url.to_owned());
            active.api_key_encrypted = Set(api_key_encrypted.to_owned());
            active.updated_at = Set(now);
            active.update(db).await
        }
        None => {
            evolution_credential::ActiveModel {
                user_id: Set(user_id),
                api_url: Set(api_url.to_owned()),
                api_key_encrypted: Set(api_key_encrypted.to_owned()),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await
        }
    }
}

pub async fn delete_credentials(db: &DatabaseConnection, user_id: i32) -> Result<u64, DbErr> {
    let result = evolution_credential::Entity::delete_by_id(user_id)
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
