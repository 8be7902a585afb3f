use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::saved_list::Entity")]
    SavedLists,

    #[sea_orm(has_many = "super::company::Entity")]
    Companies,

    #[sea_orm(has_many = "super::whatsapp_instance::Entity")]
    WhatsappInstances,

    #[sea_orm(has_one = "super::evolution_credential::Entity")]
    EvolutionCredential,
}

impl Related<super::saved_list::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SavedLists.def()
    }
}

impl Related<super::company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Companies.def()
    }
}

impl Related<super::whatsapp_instance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WhatsappInstances.def()
    }
}

impl Related<super::evolution_credential::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EvolutionCredential.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
