use chrono::Utc;
use reqwest::Url;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Deserialize;
use thiserror::Error;

use crate::db::entities::company;

#[derive(Error, Debug)]
pub enum CompanyServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

/// A company registered by hand rather than found through a search.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCompany {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
}

impl NewCompany {
    pub fn validate(&self) -> Result<(), CompanyServiceError> {
        if self.name.trim().chars().count() < 2 {
            return Err(CompanyServiceError::Validation(
                "Name must have at least 2 characters.".to_string(),
            ));
        }
        if self.address.trim().chars().count() < 5 {
            return Err(CompanyServiceError::Validation(
                "Address must have at least 5 characters.".to_string(),
            ));
        }
        check_optional_url("website", self.website.as_deref())?;
        check_optional_url("instagram", self.instagram.as_deref())?;
        Ok(())
    }
}

fn check_optional_url(field: &str, value: Option<&str>) -> Result<(), CompanyServiceError> {
    match value.map(str::trim) {
        None | Some("") => Ok(()),
        Some(raw) => Url::parse(raw).map(|_| ()).map_err(|_| {
            CompanyServiceError::Validation(format!("Please enter a valid URL for {field}."))
        }),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub async fn create_company(
    db: &DatabaseConnection,
    user_id: i32,
    new_company: NewCompany,
) -> Result<company::Model, CompanyServiceError> {
    new_company.validate()?;
    let model = company::ActiveModel {
        user_id: Set(user_id),
        name: Set(new_company.name.trim().to_owned()),
        address: Set(new_company.address.trim().to_owned()),
        phone: Set(non_blank(new_company.phone)),
        website: Set(non_blank(new_company.website)),
        instagram: Set(non_blank(new_company.instagram)),
        whatsapp: Set(non_blank(new_company.whatsapp)),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(model)
}

pub async fn list_companies(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Vec<company::Model>, DbErr> {
    company::Entity::find()
        .filter(company::Column::UserId.eq(user_id))
        .order_by_desc(company::Column::CreatedAt)
        .all(db)
        .await
}

/// Returns the number of rows removed; zero means not found or not owned.
pub async fn delete_company(
    db: &DatabaseConnection,
    company_id: i32,
    user_id: i32,
) -> Result<u64, DbErr> {
    let result = company::Entity::delete_many()
        .filter(company::Column::Id.eq(company_id))
        .filter(company::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
