use axum::{
    Json, Router,
    extract::State,
    http::{Method, header},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::gateway::{
    EvolutionClient, GatewayCredentials, GatewaySource, WhatsAppGateway, credentials,
};
use crate::places::PlacesClient;
use crate::services::auth_service;
use crate::services::encryption_service::CredentialCipher;
use crate::web::{
    error::AppError,
    middleware::auth,
    models::{LoginRequest, RegisterRequest},
    routes::*,
};
use crate::whatsapp::DispatchManager;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

pub struct AppState {
    pub db_pool: DatabaseConnection,
    pub config: Arc<ServerConfig>,
    pub cipher: CredentialCipher,
    pub http_client: reqwest::Client,
    pub places: PlacesClient,
    pub dispatch_manager: DispatchManager,
}

impl AppState {
    pub fn new(db_pool: DatabaseConnection, config: Arc<ServerConfig>) -> Result<Self, String> {
        let cipher = CredentialCipher::from_hex_key(&config.credentials_encryption_key)
            .map_err(|e| format!("Invalid CREDENTIALS_ENCRYPTION_KEY: {e}"))?;
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;
        let places = PlacesClient::new(
            http_client.clone(),
            &config.places_language,
            &config.places_region,
            config.google_maps_api_key.clone(),
        );
        let dispatch_manager = DispatchManager::new(config.dispatch_retention());

        Ok(Self {
            db_pool,
            config,
            cipher,
            http_client,
            places,
            dispatch_manager,
        })
    }

    fn client_for(&self, creds: &GatewayCredentials) -> Result<Arc<dyn WhatsAppGateway>, AppError> {
        let client = EvolutionClient::new(self.http_client.clone(), &creds.api_url, &creds.api_key)?;
        Ok(Arc::new(client))
    }

    /// The gateway a user's instance operations go through.
    pub async fn gateway_for(&self, user_id: i32) -> Result<Arc<dyn WhatsAppGateway>, AppError> {
        let creds =
            credentials::resolve_gateway(&self.db_pool, &self.cipher, &self.config, user_id)
                .await?;
        self.client_for(&creds)
    }

    /// Every distinct gateway the user can reach, user credentials first.
    pub async fn gateways_for(
        &self,
        user_id: i32,
    ) -> Result<Vec<(GatewaySource, Arc<dyn WhatsAppGateway>)>, AppError> {
        let candidates =
            credentials::candidate_gateways(&self.db_pool, &self.cipher, &self.config, user_id)
                .await?;
        candidates
            .iter()
            .map(|creds| Ok((creds.source, self.client_for(creds)?)))
            .collect()
    }
}

async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<models::UserResponse>, AppError> {
    let user_response = auth_service::register_user(&app_state.db_pool, payload).await?;
    Ok(Json(user_response))
}

async fn login_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let login_response =
        auth_service::login_user(&app_state.db_pool, payload, &app_state.config.jwt_secret)
            .await?;

    let auth_cookie = Cookie::build(("token", login_response.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(true)
        .build();

    Ok((
        [(header::SET_COOKIE, auth_cookie.to_string())],
        Json(login_response),
    ))
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let auth_state = app_state.clone();
    let require_auth = move || axum_middleware::from_fn_with_state(auth_state.clone(), auth::auth);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route(
            "/api/auth/me",
            get(auth_service::me).route_layer(require_auth()),
        )
        .nest(
            "/api/places",
            places_routes::create_places_router().route_layer(require_auth()),
        )
        .nest(
            "/api/companies",
            company_routes::create_company_router().route_layer(require_auth()),
        )
        .nest(
            "/api/lists",
            list_routes::create_list_router().route_layer(require_auth()),
        )
        .nest(
            "/api/contacts",
            contact_routes::create_contact_router().route_layer(require_auth()),
        )
        .nest(
            "/api/whatsapp/credentials",
            credentials_routes::create_credentials_router().route_layer(require_auth()),
        )
        .nest(
            "/api/whatsapp/instances",
            instance_routes::create_instance_router().route_layer(require_auth()),
        )
        .nest(
            "/api/whatsapp/dispatches",
            dispatch_routes::create_dispatch_router().route_layer(require_auth()),
        )
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use tower::ServiceExt;

    fn router() -> Router {
        router_with(MockDatabase::new(DatabaseBackend::Postgres).into_connection())
    }

    fn router_with(db: DatabaseConnection) -> Router {
        let mut config = ServerConfig::for_tests();
        config.evolution_api_url = Some("http://127.0.0.1:9".to_string());
        config.evolution_api_key = Some("shared-key".to_string());
        let state = AppState::new(db, Arc::new(config)).unwrap();
        create_axum_router(Arc::new(state))
    }

    /// A database in which the caller owns no instance rows.
    fn no_instances() -> DatabaseConnection {
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<crate::db::entities::whatsapp_instance::Model>::new()])
            .into_connection()
    }

    async fn post_json(router: Router, uri: &str, user_id: i32, body: serde_json::Value) -> StatusCode {
        router
            .oneshot(
                Request::post(uri)
                    .header("Authorization", format!("Bearer {}", token_for(user_id)))
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    fn token_for(user_id: i32) -> String {
        let now = chrono::Utc::now();
        let user = crate::db::entities::user::Model {
            id: user_id,
            username: "ana".to_string(),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        };
        auth_service::create_jwt_for_user(&user, "test-secret")
            .unwrap()
            .token
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let response = router()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let response = router()
            .oneshot(Request::get("/api/lists").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router()
            .oneshot(
                Request::get("/api/auth/me")
                    .header("Authorization", "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me_reads_identity_from_token() {
        let response = router()
            .oneshot(
                Request::get("/api/auth/me")
                    .header("Authorization", format!("Bearer {}", token_for(42)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "id": 42, "username": "ana" }));
    }

    #[tokio::test]
    async fn test_contact_import_parses_text_body() {
        let response = router()
            .oneshot(
                Request::post("/api/contacts/import")
                    .header("Cookie", format!("token={}", token_for(1)))
                    .body(Body::from("nome,telefone\nAna,5511999990000\nSem telefone,\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["contacts"][0]["source"], "csv");
    }

    #[tokio::test]
    async fn test_places_search_without_key_is_bad_request() {
        let response = router()
            .oneshot(
                Request::post("/api/places/search")
                    .header("Authorization", format!("Bearer {}", token_for(1)))
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        r#"{"address":"Av. Paulista","radius":1000,"type":"clínicas"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_dispatch_is_not_found() {
        let response = router()
            .oneshot(
                Request::get(format!("/api/whatsapp/dispatches/{}", uuid::Uuid::new_v4()))
                    .header("Authorization", format!("Bearer {}", token_for(1)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_single_send_to_foreign_instance_is_not_found() {
        let status = post_json(
            router_with(no_instances()),
            "/api/whatsapp/instances/user_1_victim/messages",
            2,
            serde_json::json!({
                "number": "5511999990000",
                "message": { "type": "text", "content": "Oi" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_single_send_rejects_malformed_instance_name() {
        let status = post_json(
            router(),
            "/api/whatsapp/instances/bad%20name/messages",
            2,
            serde_json::json!({
                "number": "5511999990000",
                "message": { "type": "text", "content": "Oi" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validate_foreign_instance_is_not_found() {
        let status = post_json(
            router_with(no_instances()),
            "/api/whatsapp/instances/validate",
            2,
            serde_json::json!({ "instanceName": "user_1_victim" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_on_foreign_instance_is_not_found() {
        let status = post_json(
            router_with(no_instances()),
            "/api/whatsapp/dispatches",
            2,
            serde_json::json!({
                "instanceName": "user_1_victim",
                "contacts": [{ "name": "Ana", "phone": "5511999990000" }],
                "messages": [{ "type": "text", "content": "Oi" }],
                "minDelaySecs": 0,
                "maxDelaySecs": 0
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_n8n_forward_on_foreign_instance_is_not_found() {
        let status = post_json(
            router_with(no_instances()),
            "/api/whatsapp/dispatches/n8n",
            2,
            serde_json::json!({
                "instanceName": "user_1_victim",
                "numbers": "5511999990000",
                "message": "Oi"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
