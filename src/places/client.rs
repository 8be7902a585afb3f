use futures::{StreamExt, stream};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PlacesError;
use super::dto::{DetailsResponse, GeocodeResponse, LatLng, PlaceDetails, PlaceResult, SearchPage};
use super::segments::{SearchTarget, resolve_segment};
use crate::db::models::Business;

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";
const MAX_PAGES: usize = 3;
const PAGE_TOKEN_DELAY: Duration = Duration::from_secs(2);
const DETAIL_CONCURRENCY: usize = 8;
const MAX_RADIUS_METERS: u32 = 50_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub address: String,
    pub radius: u32,
    #[serde(rename = "type")]
    pub segment: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), PlacesError> {
        if self.address.trim().is_empty() || self.segment.trim().is_empty() {
            return Err(PlacesError::InvalidRequest(
                "Parameters 'address' and 'type' are required.".to_string(),
            ));
        }
        if self.radius == 0 || self.radius > MAX_RADIUS_METERS {
            return Err(PlacesError::InvalidRequest(format!(
                "Radius must be between 1 and {MAX_RADIUS_METERS} meters."
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PlacesClient {
    client: Client,
    base_url: String,
    language: String,
    region: String,
    default_key: Option<String>,
}

impl PlacesClient {
    pub fn new(client: Client, language: &str, region: &str, default_key: Option<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            language: language.to_string(),
            region: region.to_string(),
            default_key: default_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Request key first, then the server key.
    pub fn resolve_key<'a>(&'a self, request_key: Option<&'a str>) -> Result<&'a str, PlacesError> {
        request_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or(self.default_key.as_deref())
            .ok_or(PlacesError::MissingKey)
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Business>, PlacesError> {
        let key = self.resolve_key(request.api_key.as_deref())?;
        request.validate()?;

        let address = request.address.trim();
        let segment = request.segment.trim();
        info!(%segment, %address, radius = request.radius, "Searching places.");

        let location = self.locate(key, address, segment).await?;
        let target = resolve_segment(segment);
        debug!(?target, "Resolved search target.");

        let first = self.nearby_first_page(key, location, request.radius, &target).await?;
        if first.status != "OK" && first.status != "ZERO_RESULTS" {
            return Err(PlacesError::Api {
                status: first.status,
                message: first
                    .error_message
                    .unwrap_or_else(|| "Unknown Places API error".to_string()),
            });
        }

        let places = collect_pages(first, MAX_PAGES, PAGE_TOKEN_DELAY, move |token| {
            self.nearby_next_page(key, token)
        })
        .await;
        info!(count = places.len(), "Places found, fetching details.");

        let businesses = stream::iter(places)
            .map(move |place| async move {
                let details = match place.place_id.as_deref() {
                    Some(place_id) => self.details(key, place_id).await,
                    None => None,
                };
                business_from(place, details)
            })
            .buffered(DETAIL_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
        Ok(businesses)
    }

    /// Geocodes the address, falling back to a text search for the segment there.
    async fn locate(&self, key: &str, address: &str, segment: &str) -> Result<LatLng, PlacesError> {
        let geocode: GeocodeResponse = self
            .get_json(
                "/geocode/json",
                &[("address", address), ("region", &self.region), ("key", key)],
            )
            .await?;
        if let Some(location) = geocode.first_location() {
            debug!(lat = location.lat, lng = location.lng, "Geocoding succeeded.");
            return Ok(location);
        }

        warn!(
            status = %geocode.status,
            error = geocode.error_message.as_deref().unwrap_or_default(),
            "Geocoding failed, falling back to text search."
        );
        let query = format!("{segment} em {address}");
        let text: SearchPage = self
            .get_json(
                "/place/textsearch/json",
                &[
                    ("query", query.as_str()),
                    ("language", &self.language),
                    ("region", &self.region),
                    ("key", key),
                ],
            )
            .await?;
        if let Some(location) = text.first_location() {
            return Ok(location);
        }

        Err(PlacesError::AddressNotFound {
            status: geocode.status,
            details: geocode
                .error_message
                .or(text.error_message)
                .unwrap_or_else(|| "No details".to_string()),
        })
    }

    async fn nearby_first_page(
        &self,
        key: &str,
        location: LatLng,
        radius: u32,
        target: &SearchTarget,
    ) -> Result<SearchPage, PlacesError> {
        let location = format!("{},{}", location.lat, location.lng);
        let radius = radius.to_string();
        let (param, value) = match target {
            SearchTarget::Type(place_type) => ("type", place_type.as_str()),
            SearchTarget::Keyword(keyword) => ("keyword", keyword.as_str()),
        };
        self.get_json(
            "/place/nearbysearch/json",
            &[
                ("location", location.as_str()),
                ("radius", radius.as_str()),
                (param, value),
                ("language", &self.language),
                ("key", key),
            ],
        )
        .await
    }

    async fn nearby_next_page(&self, key: &str, token: String) -> Result<SearchPage, PlacesError> {
        self.get_json(
            "/place/nearbysearch/json",
            &[("pagetoken", token.as_str()), ("language", &self.language), ("key", key)],
        )
        .await
    }

    /// Detail failures are logged and yield no details.
    async fn details(&self, key: &str, place_id: &str) -> Option<PlaceDetails> {
        let response: Result<DetailsResponse, _> = self
            .get_json(
                "/place/details/json",
                &[
                    ("place_id", place_id),
                    ("fields", "website,international_phone_number,url"),
                    ("language", &self.language),
                    ("key", key),
                ],
            )
            .await;
        match response {
            Ok(response) => {
                if response.result.is_none() {
                    debug!(%place_id, status = %response.status, error = ?response.error_message, "No details for place.");
                }
                response.result
            }
            Err(e) => {
                warn!(%place_id, error = %e, "Failed to fetch place details.");
                None
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, PlacesError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error_message"].as_str().map(str::to_owned))
                .unwrap_or(body);
            return Err(PlacesError::Api {
                status: status.as_u16().to_string(),
                message,
            });
        }
        serde_json::from_str(&body).map_err(|e| PlacesError::Decode(e.to_string()))
    }
}

/// Follows `next_page_token` until `max_pages` pages were read, waiting
/// `delay` before each follow-up. Stops at the first page that is not `OK`.
pub async fn collect_pages<F, Fut>(
    first: SearchPage,
    max_pages: usize,
    delay: Duration,
    mut fetch_next: F,
) -> Vec<PlaceResult>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<SearchPage, PlacesError>>,
{
    let mut results = first.results;
    let mut next_token = first.next_page_token;
    let mut pages = 1;

    while let Some(token) = next_token.take() {
        if pages >= max_pages {
            break;
        }
        tokio::time::sleep(delay).await;
        match fetch_next(token).await {
            Ok(page) if page.status == "OK" => {
                pages += 1;
                debug!(page = pages, added = page.results.len(), "Fetched next results page.");
                results.extend(page.results);
                next_token = page.next_page_token;
            }
            Ok(page) => {
                debug!(status = %page.status, "No more result pages.");
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch next results page.");
            }
        }
    }
    results
}

pub fn business_from(place: PlaceResult, details: Option<PlaceDetails>) -> Business {
    let details = details.unwrap_or_default();
    let website = details.website.or(details.url).filter(|w| !w.is_empty());
    let instagram = website
        .as_ref()
        .filter(|w| w.contains("instagram.com"))
        .cloned();
    let whatsapp = website
        .as_ref()
        .filter(|w| w.contains("wa.me") || w.contains("whatsapp"))
        .cloned();
    let open_now = place
        .opening_hours
        .as_ref()
        .and_then(|h| h.open_now)
        .unwrap_or(false);

    Business {
        name: place.name,
        address: place.vicinity.or(place.formatted_address),
        phone: details.international_phone_number,
        rating: place.rating,
        user_ratings_total: place.user_ratings_total,
        opening_hours: Some(if open_now { "Open now" } else { "Closed" }.to_string()),
        place_id: place.place_id,
        types: place.types,
        website,
        instagram,
        whatsapp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::places::dto::OpeningHours;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn place(name: &str) -> PlaceResult {
        PlaceResult {
            name: name.to_string(),
            place_id: Some(format!("id-{name}")),
            ..Default::default()
        }
    }

    fn page(status: &str, names: &[&str], token: Option<&str>) -> SearchPage {
        SearchPage {
            status: status.to_string(),
            results: names.iter().map(|n| place(n)).collect(),
            next_page_token: token.map(str::to_string),
            error_message: None,
        }
    }

    #[test]
    fn test_search_request_validation() {
        let mut request = SearchRequest {
            address: "Av. Paulista, 1000".to_string(),
            radius: 1500,
            segment: "clínicas".to_string(),
            api_key: None,
        };
        assert!(request.validate().is_ok());

        request.radius = 0;
        assert!(matches!(request.validate(), Err(PlacesError::InvalidRequest(_))));
        request.radius = 50_001;
        assert!(matches!(request.validate(), Err(PlacesError::InvalidRequest(_))));

        request.radius = 1000;
        request.segment = "  ".to_string();
        assert!(matches!(request.validate(), Err(PlacesError::InvalidRequest(_))));
    }

    #[test]
    fn test_key_resolution_order() {
        let without_default = PlacesClient::new(Client::new(), "pt-BR", "br", None);
        assert!(matches!(
            without_default.resolve_key(Some("  ")),
            Err(PlacesError::MissingKey)
        ));
        assert_eq!(without_default.resolve_key(Some("user-key")).unwrap(), "user-key");

        let with_default =
            PlacesClient::new(Client::new(), "pt-BR", "br", Some("server-key".to_string()));
        assert_eq!(with_default.resolve_key(None).unwrap(), "server-key");
        assert_eq!(with_default.resolve_key(Some("user-key")).unwrap(), "user-key");
    }

    #[test]
    fn test_business_from_derives_social_links() {
        let mut result = place("Studio Fit");
        result.vicinity = Some("Rua A, 10".to_string());
        result.opening_hours = Some(OpeningHours { open_now: Some(true) });
        let details = PlaceDetails {
            website: Some("https://www.instagram.com/studiofit".to_string()),
            international_phone_number: Some("+55 11 3333-4444".to_string()),
            url: Some("https://maps.google.com/?cid=1".to_string()),
        };

        let business = business_from(result, Some(details));
        assert_eq!(business.address.as_deref(), Some("Rua A, 10"));
        assert_eq!(business.phone.as_deref(), Some("+55 11 3333-4444"));
        assert_eq!(business.instagram, business.website);
        assert!(business.whatsapp.is_none());
        assert_eq!(business.opening_hours.as_deref(), Some("Open now"));
    }

    #[test]
    fn test_business_from_falls_back_to_maps_url() {
        let details = PlaceDetails {
            website: None,
            international_phone_number: None,
            url: Some("https://wa.me/5511999990000".to_string()),
        };
        let business = business_from(place("Padaria"), Some(details));
        assert_eq!(business.whatsapp.as_deref(), Some("https://wa.me/5511999990000"));
        assert_eq!(business.opening_hours.as_deref(), Some("Closed"));

        let bare = business_from(place("Sem detalhes"), None);
        assert!(bare.website.is_none());
        assert!(bare.phone.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_pages_stops_at_three_pages() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let results = collect_pages(page("OK", &["a", "b"], Some("t1")), 3, PAGE_TOKEN_DELAY, |token| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(token, format!("t{}", n + 1));
                Ok(page("OK", &["more"], Some(format!("t{}", n + 2).as_str())))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(results.len(), 4);
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_pages_stops_on_non_ok_page() {
        let results = collect_pages(page("OK", &["a"], Some("t1")), 3, PAGE_TOKEN_DELAY, |_| async {
            Ok(page("INVALID_REQUEST", &["ignored"], Some("t2")))
        })
        .await;
        assert_eq!(results.len(), 1);

        let results = collect_pages(page("ZERO_RESULTS", &[], None), 3, PAGE_TOKEN_DELAY, |_| async {
            Err(PlacesError::Decode("unreachable".to_string()))
        })
        .await;
        assert!(results.is_empty());
    }

    mod wire {
        use super::*;
        use httpmock::Method::GET;
        use httpmock::MockServer;
        use serde_json::json;

        fn client_for(server: &MockServer) -> PlacesClient {
            PlacesClient::new(Client::new(), "pt-BR", "br", None).with_base_url(&server.base_url())
        }

        fn request(segment: &str) -> SearchRequest {
            SearchRequest {
                address: "Pinheiros".to_string(),
                radius: 1500,
                segment: segment.to_string(),
                api_key: Some("maps-key".to_string()),
            }
        }

        #[tokio::test]
        async fn test_search_geocodes_then_enriches_with_details() {
            let server = MockServer::start_async().await;
            let geocode = server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/geocode/json")
                        .query_param("address", "Pinheiros")
                        .query_param("region", "br")
                        .query_param("key", "maps-key");
                    then.status(200).json_body(json!({
                        "status": "OK",
                        "results": [{ "geometry": { "location": { "lat": -23.5, "lng": -46.5 } } }]
                    }));
                })
                .await;
            let nearby = server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/place/nearbysearch/json")
                        .query_param("location", "-23.5,-46.5")
                        .query_param("radius", "1500")
                        .query_param("type", "clinic")
                        .query_param("key", "maps-key");
                    then.status(200).json_body(json!({
                        "status": "OK",
                        "results": [{
                            "name": "Clínica Vida",
                            "vicinity": "Rua dos Pinheiros, 100",
                            "place_id": "place-1",
                            "rating": 4.7,
                            "user_ratings_total": 85,
                            "opening_hours": { "open_now": true },
                            "types": ["doctor", "health"]
                        }]
                    }));
                })
                .await;
            let details = server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/place/details/json")
                        .query_param("place_id", "place-1")
                        .query_param("fields", "website,international_phone_number,url");
                    then.status(200).json_body(json!({
                        "status": "OK",
                        "result": {
                            "website": "https://instagram.com/clinicavida",
                            "international_phone_number": "+55 11 3333-4444"
                        }
                    }));
                })
                .await;

            let businesses = client_for(&server).search(&request("clínicas")).await.unwrap();
            geocode.assert_async().await;
            nearby.assert_async().await;
            details.assert_async().await;

            assert_eq!(businesses.len(), 1);
            let business = &businesses[0];
            assert_eq!(business.name, "Clínica Vida");
            assert_eq!(business.address.as_deref(), Some("Rua dos Pinheiros, 100"));
            assert_eq!(business.phone.as_deref(), Some("+55 11 3333-4444"));
            assert_eq!(business.opening_hours.as_deref(), Some("Open now"));
            assert_eq!(
                business.instagram.as_deref(),
                Some("https://instagram.com/clinicavida")
            );
        }

        #[tokio::test]
        async fn test_failed_geocode_falls_back_to_text_search() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/geocode/json");
                    then.status(200).json_body(json!({ "status": "ZERO_RESULTS", "results": [] }));
                })
                .await;
            let text = server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/place/textsearch/json")
                        .query_param("query", "gym em Pinheiros");
                    then.status(200).json_body(json!({
                        "status": "OK",
                        "results": [{
                            "name": "Academia Centro",
                            "geometry": { "location": { "lat": -23.6, "lng": -46.7 } }
                        }]
                    }));
                })
                .await;
            let nearby = server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/place/nearbysearch/json")
                        .query_param("location", "-23.6,-46.7")
                        .query_param("type", "gym");
                    then.status(200).json_body(json!({ "status": "ZERO_RESULTS", "results": [] }));
                })
                .await;

            let businesses = client_for(&server).search(&request("gym")).await.unwrap();
            text.assert_async().await;
            nearby.assert_async().await;
            assert!(businesses.is_empty());
        }

        #[tokio::test]
        async fn test_unresolvable_address_reports_geocoder_status() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/geocode/json");
                    then.status(200).json_body(json!({
                        "status": "REQUEST_DENIED",
                        "error_message": "The provided API key is invalid."
                    }));
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/place/textsearch/json");
                    then.status(200).json_body(json!({ "status": "REQUEST_DENIED" }));
                })
                .await;

            let err = client_for(&server).search(&request("gym")).await.unwrap_err();
            match err {
                PlacesError::AddressNotFound { status, details } => {
                    assert_eq!(status, "REQUEST_DENIED");
                    assert_eq!(details, "The provided API key is invalid.");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_nearby_error_status_is_api_error() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/geocode/json");
                    then.status(200).json_body(json!({
                        "status": "OK",
                        "results": [{ "geometry": { "location": { "lat": 1.0, "lng": 2.0 } } }]
                    }));
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/place/nearbysearch/json");
                    then.status(200).json_body(json!({
                        "status": "OVER_QUERY_LIMIT",
                        "error_message": "You have exceeded your daily request quota."
                    }));
                })
                .await;

            let err = client_for(&server).search(&request("gym")).await.unwrap_err();
            match err {
                PlacesError::Api { status, message } => {
                    assert_eq!(status, "OVER_QUERY_LIMIT");
                    assert_eq!(message, "You have exceeded your daily request quota.");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_http_failure_carries_remote_error_message() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/geocode/json");
                    then.status(403).json_body(json!({
                        "status": "REQUEST_DENIED",
                        "error_message": "This API project is not authorized."
                    }));
                })
                .await;

            let err = client_for(&server).search(&request("gym")).await.unwrap_err();
            match err {
                PlacesError::Api { status, message } => {
                    assert_eq!(status, "403");
                    assert_eq!(message, "This API project is not authorized.");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
