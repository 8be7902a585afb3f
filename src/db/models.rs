use serde::{Deserialize, Serialize};

/// A business returned by a Places search.
///
/// Saved lists store these as JSON snapshots, so every field except `name`
/// is optional to accept lists built from bare phone numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Business {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "formatted_phone_number")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ratings_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
}

impl Business {
    pub fn from_phone(name: String, phone: String) -> Self {
        Self {
            name,
            phone: Some(phone),
            ..Default::default()
        }
    }
}

/// Parameters of the search that produced a saved list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub address: String,
    pub radius: u32,
    #[serde(rename = "type")]
    pub segment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_snapshot_accepts_legacy_phone_field() {
        let json = serde_json::json!({
            "name": "Pet Shop Amigo Fiel",
            "formatted_phone_number": "(11) 12345-6789"
        });
        let business: Business = serde_json::from_value(json).unwrap();
        assert_eq!(business.phone.as_deref(), Some("(11) 12345-6789"));
        assert!(business.types.is_empty());
    }

    #[test]
    fn test_business_serialization_omits_empty_fields() {
        let business = Business::from_phone("Contact 1".to_string(), "5511999999999".to_string());
        let value = serde_json::to_value(&business).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "name": "Contact 1", "phone": "5511999999999" })
        );
    }
}
