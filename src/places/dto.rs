//! Wire shapes of the Places and Geocoding JSON APIs. Only the fields we read.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResult {
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
    pub error_message: Option<String>,
}

impl GeocodeResponse {
    pub fn first_location(&self) -> Option<LatLng> {
        if self.status != "OK" {
            return None;
        }
        self.results
            .first()
            .and_then(|r| r.geometry.as_ref())
            .map(|g| g.location)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpeningHours {
    pub open_now: Option<bool>,
}

/// One entry of a Nearby Search or Text Search page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceResult {
    #[serde(default)]
    pub name: String,
    pub vicinity: Option<String>,
    pub formatted_address: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub opening_hours: Option<OpeningHours>,
    pub place_id: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    pub status: String,
    #[serde(default)]
    pub results: Vec<PlaceResult>,
    pub next_page_token: Option<String>,
    pub error_message: Option<String>,
}

impl SearchPage {
    pub fn first_location(&self) -> Option<LatLng> {
        if self.status != "OK" {
            return None;
        }
        self.results
            .first()
            .and_then(|r| r.geometry.as_ref())
            .map(|g| g.location)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceDetails {
    pub website: Option<String>,
    pub international_phone_number: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailsResponse {
    pub status: String,
    pub result: Option<PlaceDetails>,
    pub error_message: Option<String>,
}
