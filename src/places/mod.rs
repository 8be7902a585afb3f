//! Business search through the Places and Geocoding APIs.

use thiserror::Error;

pub mod client;
pub mod dto;
pub mod segments;

pub use client::{PlacesClient, SearchRequest};

#[derive(Error, Debug)]
pub enum PlacesError {
    #[error("Places API key not configured")]
    MissingKey,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Address not found ({status}): {details}")]
    AddressNotFound { status: String, details: String },
    #[error("Places API error {status}: {message}")]
    Api { status: String, message: String },
    #[error("Network error while calling the Places API: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid response from the Places API: {0}")]
    Decode(String),
}
