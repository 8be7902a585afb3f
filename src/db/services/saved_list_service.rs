use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::db::entities::saved_list;
use crate::db::models::{Business, SearchParams};

#[derive(Error, Debug)]
pub enum ListServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("Saved list not found")]
    NotFound,
    #[error("Failed to encode list contents: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

/// Row shape for list overviews.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedListSummary {
    pub id: Uuid,
    pub name: String,
    pub company_count: usize,
    pub search_params: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<&saved_list::Model> for SavedListSummary {
    fn from(model: &saved_list::Model) -> Self {
        let company_count = model
            .companies
            .as_array()
            .map(|companies| companies.len())
            .unwrap_or(0);
        Self {
            id: model.id,
            name: model.name.clone(),
            company_count,
            search_params: model.search_params.clone(),
            created_at: model.created_at,
        }
    }
}

/// Decodes the stored snapshot. Entries that no longer parse are skipped.
pub fn list_businesses(model: &saved_list::Model) -> Vec<Business> {
    let Some(entries) = model.companies.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<Business>(entry.clone()) {
            Ok(business) => Some(business),
            Err(e) => {
                warn!(list_id = %model.id, error = %e, "Skipping malformed saved list entry.");
                None
            }
        })
        .collect()
}

/// One business per non-blank line, named by its position.
pub fn businesses_from_numbers(numbers_text: &str) -> Vec<Business> {
    numbers_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, phone)| Business::from_phone(format!("Contact {}", i + 1), phone.to_owned()))
        .collect()
}

pub async fn create_saved_list(
    db: &DatabaseConnection,
    user_id: i32,
    name: &str,
    companies: &[Business],
    search_params: Option<&SearchParams>,
) -> Result<saved_list::Model, ListServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ListServiceError::Validation(
            "List name is required.".to_string(),
        ));
    }
    if companies.is_empty() {
        return Err(ListServiceError::Validation(
            "A saved list needs at least one company.".to_string(),
        ));
    }

    let search_params = search_params.map(serde_json::to_value).transpose()?;
    let model = saved_list::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        name: Set(name.to_owned()),
        companies: Set(serde_json::to_value(companies)?),
        search_params: Set(search_params),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;
    Ok(model)
}

pub async fn create_saved_list_from_numbers(
    db: &DatabaseConnection,
    user_id: i32,
    name: &str,
    numbers_text: &str,
) -> Result<saved_list::Model, ListServiceError> {
    let companies = businesses_from_numbers(numbers_text);
    if companies.is_empty() {
        return Err(ListServiceError::Validation(
            "Provide at least one phone number.".to_string(),
        ));
    }
    create_saved_list(db, user_id, name, &companies, None).await
}

pub async fn list_saved_lists(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Vec<saved_list::Model>, DbErr> {
    saved_list::Entity::find()
        .filter(saved_list::Column::UserId.eq(user_id))
        .order_by_desc(saved_list::Column::CreatedAt)
        .all(db)
        .await
}

pub async fn get_saved_list(
    db: &DatabaseConnection,
    list_id: Uuid,
    user_id: i32,
) -> Result<saved_list::Model, ListServiceError> {
    saved_list::Entity::find_by_id(list_id)
        .filter(saved_list::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(ListServiceError::NotFound)
}

pub async fn delete_saved_list(
    db: &DatabaseConnection,
    list_id: Uuid,
    user_id: i32,
) -> Result<(), ListServiceError> {
    let result = saved_list::Entity::delete_many()
        .filter(saved_list::Column::Id.eq(list_id))
        .filter(saved_list::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ListServiceError::NotFound);
    }
    Ok(())
}
