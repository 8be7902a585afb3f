use serde::{Deserialize, Serialize};

use crate::db::models::Business;
use crate::db::services::businesses_from_numbers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    SavedList,
    Csv,
    #[default]
    Manual,
}

/// A dispatch recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub source: ContactSource,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>, source: ContactSource) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            source,
        }
    }
}

/// Businesses that carry a phone number, as saved-list contacts.
pub fn contacts_from_businesses(businesses: &[Business]) -> Vec<Contact> {
    businesses
        .iter()
        .filter_map(|business| {
            let phone = business.phone.as_deref()?.trim();
            (!phone.is_empty())
                .then(|| Contact::new(business.name.clone(), phone, ContactSource::SavedList))
        })
        .collect()
}

/// Raw numbers, one per line, named the same way as a list saved from numbers.
pub fn contacts_from_numbers(numbers_text: &str) -> Vec<Contact> {
    businesses_from_numbers(numbers_text)
        .into_iter()
        .filter_map(|business| {
            let phone = business.phone?;
            Some(Contact::new(business.name, phone, ContactSource::Manual))
        })
        .collect()
}
