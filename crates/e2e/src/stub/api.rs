//! Stub control API
//!
//! An axum router over a `ProfileStore` exposing the control API the harness
//! consumes. Every rule lives in the store; handlers only translate.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use profile_e2e_common::{
    DuplicateRequest, ErrorBody, NewProfile, ProfileId, ProfileStore, ProfileUpdate,
};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::ApiConfig;
use crate::error::{E2eError, E2eResult};

/// Actor recorded on rows changed through the stub
pub const STUB_ACTOR: &str = "e2e-stub";

/// Store errors rendered as `{detail}` with the matching status
struct StubError(profile_e2e_common::Error);

impl From<profile_e2e_common::Error> for StubError {
    fn from(e: profile_e2e_common::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for StubError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Stub store error: {}", self.0);
        }
        (status, Json(ErrorBody { detail: self.0.to_string() })).into_response()
    }
}

type StubResult<T> = Result<T, StubError>;

/// Router serving the control API under `/api`
pub fn router(store: ProfileStore) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/profiles", get(list_profiles_handler).post(create_profile_handler))
        .route("/api/profiles/current", get(current_profile_handler))
        .route(
            "/api/profiles/:id",
            get(get_profile_handler)
                .put(update_profile_handler)
                .delete(delete_profile_handler),
        )
        .route("/api/profiles/:id/load", post(load_profile_handler))
        .route("/api/profiles/:id/set-default", post(set_default_handler))
        .route("/api/profiles/:id/duplicate", post(duplicate_profile_handler))
        .route("/api/slide-styles", get(list_slide_styles_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/:id", get(get_session_handler))
        .route("/api/sessions/:id/restore", post(restore_session_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_profiles_handler(State(store): State<ProfileStore>) -> StubResult<impl IntoResponse> {
    Ok(Json(store.list_profiles()?))
}

async fn create_profile_handler(
    State(store): State<ProfileStore>,
    Json(request): Json<NewProfile>,
) -> StubResult<impl IntoResponse> {
    let profile = store.create_profile(&request, STUB_ACTOR)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn current_profile_handler(State(store): State<ProfileStore>) -> StubResult<impl IntoResponse> {
    Ok(Json(store.current_profile()?))
}

async fn get_profile_handler(
    State(store): State<ProfileStore>,
    Path(id): Path<ProfileId>,
) -> StubResult<impl IntoResponse> {
    Ok(Json(store.get_profile(id)?))
}

async fn update_profile_handler(
    State(store): State<ProfileStore>,
    Path(id): Path<ProfileId>,
    Json(update): Json<ProfileUpdate>,
) -> StubResult<impl IntoResponse> {
    Ok(Json(store.update_profile(id, &update, STUB_ACTOR)?))
}

async fn delete_profile_handler(
    State(store): State<ProfileStore>,
    Path(id): Path<ProfileId>,
) -> StubResult<impl IntoResponse> {
    store.delete_profile(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn load_profile_handler(
    State(store): State<ProfileStore>,
    Path(id): Path<ProfileId>,
) -> StubResult<impl IntoResponse> {
    Ok(Json(store.load_profile(id)?))
}

async fn set_default_handler(
    State(store): State<ProfileStore>,
    Path(id): Path<ProfileId>,
) -> StubResult<impl IntoResponse> {
    Ok(Json(store.set_default(id, STUB_ACTOR)?))
}

async fn duplicate_profile_handler(
    State(store): State<ProfileStore>,
    Path(id): Path<ProfileId>,
    Json(request): Json<DuplicateRequest>,
) -> StubResult<impl IntoResponse> {
    let profile = store.duplicate_profile(id, &request.name, STUB_ACTOR)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn list_slide_styles_handler(State(store): State<ProfileStore>) -> StubResult<impl IntoResponse> {
    Ok(Json(store.list_slide_styles()?))
}

async fn create_session_handler(State(store): State<ProfileStore>) -> StubResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(store.create_session()?)))
}

async fn get_session_handler(
    State(store): State<ProfileStore>,
    Path(id): Path<String>,
) -> StubResult<impl IntoResponse> {
    Ok(Json(store.get_session(&id)?))
}

async fn restore_session_handler(
    State(store): State<ProfileStore>,
    Path(id): Path<String>,
) -> StubResult<impl IntoResponse> {
    Ok(Json(store.restore_session(&id)?))
}

/// Stub API served on an ephemeral local port; stops when dropped
pub struct StubServer {
    pub addr: SocketAddr,
    pub store: ProfileStore,
    task: JoinHandle<()>,
}

impl StubServer {
    /// Bind `127.0.0.1:0` and serve `store` in the background
    pub async fn serve(store: ProfileStore) -> E2eResult<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(store.clone());

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Stub API stopped: {}", e);
            }
        });

        info!("Stub control API listening on http://{}", addr);
        Ok(Self { addr, store, task })
    }

    /// Fresh in-memory store seeded with the default profile
    pub async fn serve_memory() -> E2eResult<Self> {
        let store = ProfileStore::open_memory().map_err(|e| E2eError::ServerStartup(e.to_string()))?;
        Self::serve(store).await
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this server
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url(),
            ..ApiConfig::default()
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        debug!("Stopping stub control API on {}", self.addr);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HttpProfileApi, ProfileApi};
    use profile_e2e_common::{ProfileAttributes, LAST_PROFILE_DETAIL};

    async fn client() -> (StubServer, HttpProfileApi) {
        let server = StubServer::serve_memory().await.unwrap();
        let api = HttpProfileApi::new(&server.api_config()).unwrap();
        (server, api)
    }

    fn named(name: &str) -> NewProfile {
        NewProfile {
            name: name.to_string(),
            attributes: ProfileAttributes::default(),
        }
    }

    #[tokio::test]
    async fn test_seeded_store_serves_default_profile() {
        let (_server, api) = client().await;
        api.health().await.unwrap();

        let profiles = api.list_profiles().await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert!(profiles[0].is_default);
        assert_eq!(api.current_profile().await.unwrap().id, profiles[0].id);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_409_with_detail() {
        let (_server, api) = client().await;
        api.create_profile(&named("Ops")).await.unwrap();

        let err = api.create_profile(&named("Ops")).await.unwrap_err();
        assert_eq!(err.to_string(), "Profile with name 'Ops' already exists");
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_last_profile_delete_is_refused() {
        let (_server, api) = client().await;
        let only = api.list_profiles().await.unwrap().remove(0);

        let err = api.delete_profile(only.id).await.unwrap_err();
        assert!(matches!(err, E2eError::LastEntity(ref d) if d == LAST_PROFILE_DETAIL));
    }

    #[tokio::test]
    async fn test_unknown_profile_is_404() {
        let (_server, api) = client().await;
        assert!(api.get_profile(9999).await.unwrap_err().is_not_found());
        assert!(api.delete_profile(9999).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_current_is_not_captured_by_id_route() {
        let (_server, api) = client().await;
        let created = api.create_profile(&named("Loaded")).await.unwrap();
        api.load_profile(created.id).await.unwrap();
        assert_eq!(api.current_profile().await.unwrap().name, "Loaded");
    }
}
