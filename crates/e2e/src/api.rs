//! Control API port and its reqwest implementation

use async_trait::async_trait;
use profile_e2e_common::{
    DuplicateRequest, ErrorBody, LoadResponse, NewProfile, Profile, ProfileId, ProfileUpdate,
    RestoreOutcome, Session, SlideStyle, LAST_PROFILE_DETAIL,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{Channel, E2eError, E2eResult};

/// Backend control API consumed by the provisioner and the API state reader
#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn health(&self) -> E2eResult<()>;

    async fn list_profiles(&self) -> E2eResult<Vec<Profile>>;

    async fn get_profile(&self, id: ProfileId) -> E2eResult<Profile>;

    async fn create_profile(&self, request: &NewProfile) -> E2eResult<Profile>;

    async fn update_profile(&self, id: ProfileId, update: &ProfileUpdate) -> E2eResult<Profile>;

    async fn delete_profile(&self, id: ProfileId) -> E2eResult<()>;

    async fn load_profile(&self, id: ProfileId) -> E2eResult<LoadResponse>;

    async fn set_default(&self, id: ProfileId) -> E2eResult<Profile>;

    async fn duplicate_profile(&self, id: ProfileId, name: &str) -> E2eResult<Profile>;

    async fn current_profile(&self) -> E2eResult<Profile>;

    async fn list_slide_styles(&self) -> E2eResult<Vec<SlideStyle>>;

    async fn create_session(&self) -> E2eResult<Session>;

    async fn get_session(&self, id: &str) -> E2eResult<Session>;

    async fn restore_session(&self, id: &str) -> E2eResult<RestoreOutcome>;

    /// The API has no name lookup; names are resolved from a fresh listing
    async fn find_by_name(&self, name: &str) -> E2eResult<Option<Profile>> {
        Ok(self
            .list_profiles()
            .await?
            .into_iter()
            .find(|p| p.name == name))
    }
}

/// What a request was about, for error mapping
struct Target<'a> {
    kind: &'static str,
    id: String,
    name: Option<&'a str>,
}

impl<'a> Target<'a> {
    fn profile(id: ProfileId) -> Self {
        Self { kind: "profile", id: id.to_string(), name: None }
    }

    fn named(kind: &'static str, id: impl ToString, name: &'a str) -> Self {
        Self { kind, id: id.to_string(), name: Some(name) }
    }

    fn session(id: &str) -> Self {
        Self { kind: "session", id: id.to_string(), name: None }
    }
}

/// HTTP client for the profile control API
#[derive(Clone)]
pub struct HttpProfileApi {
    client: reqwest::Client,
    root: String,
}

impl HttpProfileApi {
    pub fn new(config: &ApiConfig) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            root: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                config.prefix.trim_end_matches('/')
            ),
        })
    }

    /// Root URL every path is appended to
    pub fn root(&self) -> &str {
        &self.root
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.root, path);
        debug!("{} {}", method, url);
        self.client.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, target: Target<'_>) -> E2eResult<T> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(map_error(status, &body, &target))
    }

    async fn send_empty(&self, builder: RequestBuilder, target: Target<'_>) -> E2eResult<()> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(map_error(status, &body, &target))
    }
}

/// Translate a non-2xx control API response into the error taxonomy
fn map_error(status: StatusCode, body: &str, target: &Target<'_>) -> E2eError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.detail)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        StatusCode::NOT_FOUND => E2eError::not_found(target.kind, &target.id, Channel::Api),
        StatusCode::CONFLICT if detail == LAST_PROFILE_DETAIL => E2eError::LastEntity(detail),
        StatusCode::CONFLICT => E2eError::Conflict {
            name: target.name.unwrap_or_default().to_string(),
            detail,
        },
        _ => E2eError::Api {
            status: status.as_u16(),
            detail,
        },
    }
}

#[async_trait]
impl ProfileApi for HttpProfileApi {
    async fn health(&self) -> E2eResult<()> {
        let resp = self.request(Method::GET, "/health").send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(E2eError::Api {
                status: resp.status().as_u16(),
                detail: "health check failed".to_string(),
            })
        }
    }

    async fn list_profiles(&self) -> E2eResult<Vec<Profile>> {
        self.send(self.request(Method::GET, "/profiles"), Target::profile(-1)).await
    }

    async fn get_profile(&self, id: ProfileId) -> E2eResult<Profile> {
        self.send(
            self.request(Method::GET, &format!("/profiles/{}", id)),
            Target::profile(id),
        )
        .await
    }

    async fn create_profile(&self, request: &NewProfile) -> E2eResult<Profile> {
        self.send(
            self.request(Method::POST, "/profiles").json(request),
            Target::named("profile", &request.name, &request.name),
        )
        .await
    }

    async fn update_profile(&self, id: ProfileId, update: &ProfileUpdate) -> E2eResult<Profile> {
        let target = match &update.name {
            Some(name) => Target::named("profile", id, name),
            None => Target::profile(id),
        };
        self.send(
            self.request(Method::PUT, &format!("/profiles/{}", id)).json(update),
            target,
        )
        .await
    }

    async fn delete_profile(&self, id: ProfileId) -> E2eResult<()> {
        self.send_empty(
            self.request(Method::DELETE, &format!("/profiles/{}", id)),
            Target::profile(id),
        )
        .await
    }

    async fn load_profile(&self, id: ProfileId) -> E2eResult<LoadResponse> {
        self.send(
            self.request(Method::POST, &format!("/profiles/{}/load", id)),
            Target::profile(id),
        )
        .await
    }

    async fn set_default(&self, id: ProfileId) -> E2eResult<Profile> {
        self.send(
            self.request(Method::POST, &format!("/profiles/{}/set-default", id)),
            Target::profile(id),
        )
        .await
    }

    async fn duplicate_profile(&self, id: ProfileId, name: &str) -> E2eResult<Profile> {
        let body = DuplicateRequest { name: name.to_string() };
        self.send(
            self.request(Method::POST, &format!("/profiles/{}/duplicate", id)).json(&body),
            Target::named("profile", id, name),
        )
        .await
    }

    async fn current_profile(&self) -> E2eResult<Profile> {
        self.send(
            self.request(Method::GET, "/profiles/current"),
            Target::profile(-1),
        )
        .await
    }

    async fn list_slide_styles(&self) -> E2eResult<Vec<SlideStyle>> {
        self.send(
            self.request(Method::GET, "/slide-styles"),
            Target { kind: "slide_style", id: String::new(), name: None },
        )
        .await
    }

    async fn create_session(&self) -> E2eResult<Session> {
        self.send(self.request(Method::POST, "/sessions"), Target::session("")).await
    }

    async fn get_session(&self, id: &str) -> E2eResult<Session> {
        self.send(
            self.request(Method::GET, &format!("/sessions/{}", id)),
            Target::session(id),
        )
        .await
    }

    async fn restore_session(&self, id: &str) -> E2eResult<RestoreOutcome> {
        self.send(
            self.request(Method::POST, &format!("/sessions/{}/restore", id)),
            Target::session(id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_keeps_server_detail_verbatim() {
        let body = r#"{"detail":"Profile with name 'Ops' already exists"}"#;
        let err = map_error(StatusCode::CONFLICT, body, &Target::named("profile", "Ops", "Ops"));
        match err {
            E2eError::Conflict { name, detail } => {
                assert_eq!(name, "Ops");
                assert_eq!(detail, "Profile with name 'Ops' already exists");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_last_profile_conflict_maps_to_last_entity() {
        let body = r#"{"detail":"Cannot delete the last profile"}"#;
        let err = map_error(StatusCode::CONFLICT, body, &Target::profile(1));
        assert!(matches!(err, E2eError::LastEntity(_)));
    }

    #[test]
    fn test_not_found_is_tagged_with_api_channel() {
        let err = map_error(StatusCode::NOT_FOUND, "", &Target::profile(42));
        match err {
            E2eError::NotFound { kind, id, channel } => {
                assert_eq!(kind, "profile");
                assert_eq!(id, "42");
                assert_eq!(channel, Channel::Api);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_body_becomes_detail() {
        let err = map_error(StatusCode::BAD_GATEWAY, "upstream down\n", &Target::profile(1));
        match err {
            E2eError::Api { status, detail } => {
                assert_eq!(status, 502);
                assert_eq!(detail, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
