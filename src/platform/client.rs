use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{
    header::{self, HeaderMap},
    Client, RequestBuilder, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    config::PlatformConfig,
    domain::SubscriberInfo,
    error::ExternalServiceError,
};

use super::{
    api::{
        self, malformed, CatalogEntry, LoginRequest, SearchUrlRequest, SearchUrlResponse,
        SearchUserRequest, SearchUserResponse, SetSettingsRequest, SubscriberPolicy,
        TagListRequest, TagListResponse, TagValueRequest, TrafficRecordRequest, TrafficReport,
    },
    FilterPlatform,
};

pub struct PlatformClient {
    http: Client,
    config: PlatformConfig,
    session: RwLock<Option<String>>,
}

impl PlatformClient {
    pub fn new(http: Client, config: PlatformConfig) -> Self {
        Self {
            http,
            config,
            session: RwLock::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn login(&self) -> Result<String, ExternalServiceError> {
        let response = self
            .http
            .post(self.endpoint(api::LOGIN_PATH))
            .timeout(self.config.request_timeout)
            .json(&LoginRequest {
                phone: &self.config.username,
                password: &self.config.password,
            })
            .send()
            .await
            .map_err(|source| ExternalServiceError::Transport {
                endpoint: api::LOGIN_PATH,
                source,
            })?;

        require_ok(api::LOGIN_PATH, response.status())?;
        let cookie =
            session_from_headers(response.headers()).ok_or(ExternalServiceError::MissingSession)?;

        tracing::debug!(target: "platform", "platform session established");
        *self.session.write() = Some(cookie.clone());
        Ok(cookie)
    }

    async fn session_cookie(&self) -> Result<String, ExternalServiceError> {
        let cached = self.session.read().clone();
        match cached {
            Some(cookie) => Ok(cookie),
            None => self.login().await,
        }
    }

    /// Sends an authenticated request and insists on a 200 answer.
    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, ExternalServiceError> {
        let cookie = self.session_cookie().await?;
        let response = request
            .header(header::COOKIE, cookie)
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|source| ExternalServiceError::Transport { endpoint, source })?;

        let status = response.status();
        if invalidates_session(status) {
            self.session.write().take();
        }
        if let Err(err) = require_ok(endpoint, status) {
            tracing::warn!(target: "platform", endpoint, status = status.as_u16(), "platform call rejected");
            return Err(err);
        }
        Ok(response)
    }

    async fn post_json<B, T>(&self, endpoint: &'static str, body: &B) -> Result<T, ExternalServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.endpoint(endpoint)).json(body);
        let response = self.send(endpoint, request).await?;
        decode(endpoint, response).await
    }
}

/// `name=value` pairs of every `Set-Cookie` header, joined for a `Cookie` header.
fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookie = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    (!cookie.is_empty()).then_some(cookie)
}

fn invalidates_session(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Only a plain 200 counts as success; redirects and other 2xx answers are rejections.
fn require_ok(endpoint: &'static str, status: StatusCode) -> Result<(), ExternalServiceError> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(ExternalServiceError::Status {
            endpoint,
            status: status.as_u16(),
        })
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &'static str,
    response: Response,
) -> Result<T, ExternalServiceError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|source| ExternalServiceError::Transport { endpoint, source })?;
    serde_json::from_slice(&bytes).map_err(|err| malformed(endpoint, &err.to_string()))
}

#[async_trait]
impl FilterPlatform for PlatformClient {
    async fn search_host(&self, url_or_domain: &str) -> Result<String, ExternalServiceError> {
        let response: SearchUrlResponse = self
            .post_json(api::SEARCH_URL_PATH, &SearchUrlRequest {
                search: url_or_domain,
            })
            .await?;
        Ok(response.found_host.unwrap_or_default())
    }

    async fn lookup_tags(&self, host: &str) -> Result<Vec<i64>, ExternalServiceError> {
        let body: Value = self
            .post_json(api::TAG_VALUE_PATH, &TagValueRequest { host })
            .await?;
        api::parse_tag_ids(&body)
    }

    async fn fetch_policy(&self, subscriber: i64) -> Result<SubscriberPolicy, ExternalServiceError> {
        let request = self
            .http
            .get(self.endpoint(api::GET_SETTINGS_PATH))
            .query(&[("id", subscriber)]);
        let response = self.send(api::GET_SETTINGS_PATH, request).await?;
        let body: Value = decode(api::GET_SETTINGS_PATH, response).await?;
        SubscriberPolicy::from_settings(body)
    }

    async fn push_policy(
        &self,
        subscriber: i64,
        policy: &SubscriberPolicy,
    ) -> Result<(), ExternalServiceError> {
        let payload = SetSettingsRequest {
            id: subscriber,
            filter_settings: &policy.filter_settings,
            inspector_settings: &policy.inspector_settings,
        };
        let request = self
            .http
            .post(self.endpoint(api::SET_SETTINGS_PATH))
            .json(&payload);
        self.send(api::SET_SETTINGS_PATH, request).await?;
        Ok(())
    }

    async fn find_subscriber(
        &self,
        subscriber: i64,
    ) -> Result<Option<SubscriberInfo>, ExternalServiceError> {
        let response: SearchUserResponse = self
            .post_json(api::SEARCH_USER_PATH, &SearchUserRequest {
                search: subscriber,
                last_surfing: false,
            })
            .await?;
        Ok(response.users.into_iter().next().map(SubscriberInfo::from))
    }

    async fn list_categories(&self) -> Result<Vec<CatalogEntry>, ExternalServiceError> {
        let response: TagListResponse = self
            .post_json(api::TAG_LIST_PATH, &TagListRequest { inspector: true })
            .await?;
        Ok(response.list)
    }

    async fn traffic_record(&self, key: &str) -> Result<TrafficReport, ExternalServiceError> {
        let body: Value = self
            .post_json(api::TRAFFIC_RECORD_PATH, &TrafficRecordRequest { key })
            .await?;
        api::parse_traffic_record(&body)
    }
}
