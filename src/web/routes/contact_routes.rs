use axum::{Json, Router, routing::post};
use serde::Serialize;
use std::sync::Arc;

use crate::csv;
use crate::web::AppState;
use crate::whatsapp::Contact;

#[derive(Serialize)]
pub struct ImportResponse {
    count: usize,
    contacts: Vec<Contact>,
}

async fn import_contacts_handler(body: String) -> Json<ImportResponse> {
    let contacts = csv::import_contacts(&body);
    Json(ImportResponse {
        count: contacts.len(),
        contacts,
    })
}

pub fn create_contact_router() -> Router<Arc<AppState>> {
    Router::new().route("/import", post(import_contacts_handler))
}
