use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{company, evolution_credential, saved_list, user, whatsapp_instance};

/// Creates any missing tables. Existing tables are left untouched.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Parents first so foreign keys resolve.
    create_table(db, user::Entity).await?;
    create_table(db, company::Entity).await?;
    create_table(db, saved_list::Entity).await?;
    create_table(db, whatsapp_instance::Entity).await?;
    create_table(db, evolution_credential::Entity).await?;
    info!("Database schema verified.");
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}
