//! SeaORM entities for the prospecting store.

pub mod company;
pub mod evolution_credential;
pub mod saved_list;
pub mod user;
pub mod whatsapp_instance;

pub mod prelude {
    pub use super::user::ActiveModel as UserActiveModel;
    pub use super::user::Column as UserColumn;
    pub use super::user::Entity as User;
    pub use super::user::Model as UserModel;

    pub use super::company::ActiveModel as CompanyActiveModel;
    pub use super::company::Column as CompanyColumn;
    pub use super::company::Entity as Company;
    pub use super::company::Model as CompanyModel;

    pub use super::saved_list::ActiveModel as SavedListActiveModel;
    pub use super::saved_list::Column as SavedListColumn;
    pub use super::saved_list::Entity as SavedList;
    pub use super::saved_list::Model as SavedListModel;

    pub use super::whatsapp_instance::ActiveModel as WhatsappInstanceActiveModel;
    pub use super::whatsapp_instance::Column as WhatsappInstanceColumn;
    pub use super::whatsapp_instance::Entity as WhatsappInstance;
    pub use super::whatsapp_instance::Model as WhatsappInstanceModel;

    pub use super::evolution_credential::ActiveModel as EvolutionCredentialActiveModel;
    pub use super::evolution_credential::Column as EvolutionCredentialColumn;
    pub use super::evolution_credential::Entity as EvolutionCredential;
    pub use super::evolution_credential::Model as EvolutionCredentialModel;
}
