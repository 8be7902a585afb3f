use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set,
};

use crate::db::entities::whatsapp_instance;
use crate::db::enums::InstanceStatus;

pub async fn create_instance_record(
    db: &DatabaseConnection,
    user_id: i32,
    instance_id: &str,
    phone_number: Option<&str>,
) -> Result<whatsapp_instance::Model, DbErr> {
    let now = Utc::now();
    whatsapp_instance::ActiveModel {
        user_id: Set(user_id),
        instance_id: Set(instance_id.to_owned()),
        phone_number: Set(phone_number.map(str::to_owned)),
        status: Set(InstanceStatus::Pending),
        qr_code: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn list_instances(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Vec<whatsapp_instance::Model>, DbErr> {
    whatsapp_instance::Entity::find()
        .filter(whatsapp_instance::Column::UserId.eq(user_id))
        .order_by_desc(whatsapp_instance::Column::CreatedAt)
        .all(db)
        .await
}

pub async fn find_instance(
    db: &DatabaseConnection,
    user_id: i32,
    instance_id: &str,
) -> Result<Option<whatsapp_instance::Model>, DbErr> {
    whatsapp_instance::Entity::find()
        .filter(whatsapp_instance::Column::UserId.eq(user_id))
        .filter(whatsapp_instance::Column::InstanceId.eq(instance_id))
        .one(db)
        .await
}

/// Stores a freshly fetched QR code.
pub async fn update_instance_qr_code(
    db: &DatabaseConnection,
    instance: whatsapp_instance::Model,
    qr_code: &str,
) -> Result<whatsapp_instance::Model, DbErr> {
    let mut active = instance.into_active_model();
    active.qr_code = Set(Some(qr_code.to_owned()));
    active.updated_at = Set(Utc::now());
    active.update(db).await
}

/// Stores a status observed on the gateway. The phone number is only
/// overwritten when the gateway reported one.
pub async fn update_instance_status(
    db: &DatabaseConnection,
    instance: whatsapp_instance::Model,
    status: InstanceStatus,
    phone_number: Option<&str>,
) -> Result<whatsapp_instance::Model, DbErr> {
    let mut active = instance.into_active_model();
    active.status = Set(status);
    if let Some(phone) = phone_number {
        active.phone_number = Set(Some(phone.to_owned()));
    }
    active.updated_at = Set(Utc::now());
    active.update(db).await
}

pub async fn delete_instance_record(
    db: &DatabaseConnection,
    user_id: i32,
    instance_id: &str,
) -> Result<u64, DbErr> {
    let result = whatsapp_instance::Entity::delete_many()
        .filter(whatsapp_instance::Column::UserId.eq(user_id))
        .filter(whatsapp_instance::Column::InstanceId.eq(instance_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
