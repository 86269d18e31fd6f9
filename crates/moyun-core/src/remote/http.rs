//! Realtime-database REST transport

use std::fmt;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{paths, RemoteError, RemoteResult, RemoteTransport};
use crate::config::RemoteConfig;
use crate::util::compact_text;

/// Speaks the `{base}/{path}.json?auth=token` REST dialect
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    auth_token: Option<String>,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let base_url = config.normalized_database_url()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            base_url,
            auth_token: config.auth_token.clone(),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> RemoteResult<String> {
        paths::validate(path)?;
        Ok(format!("{}/{path}.json", self.base_url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token.as_str())]),
            None => request,
        }
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            tracing::warn!("Remote store denied access to {}", path);
            return Err(RemoteError::PermissionDenied(path.to_string()));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Api {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }
}

impl RemoteTransport for HttpTransport {
    async fn get(&self, path: &str) -> RemoteResult<Option<Value>> {
        let url = self.url(path)?;
        let response = self.send(path, self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value = response.json::<Value>().await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn put(&self, path: &str, value: &Value) -> RemoteResult<()> {
        let url = self.url(path)?;
        let request = self
            .client
            .put(url)
            .query(&[("print", "silent")])
            .json(value);
        let response = self.send(path, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RemoteError::Api {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("write target {path} not found"),
            });
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> RemoteResult<()> {
        let url = self.url(path)?;
        self.send(path, self.client.delete(url)).await?;
        Ok(())
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_connect() || error.is_timeout() {
            Self::Unavailable(error.to_string())
        } else {
            Self::Http(error)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorResponse>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let compact = compact_text(body);
    if compact.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> RemoteConfig {
        RemoteConfig {
            database_url: url.to_string(),
            auth_token: Some("secret-token".to_string()),
            timeout_secs: 5,
        }
    }

    #[test]
    fn builds_json_urls_under_trimmed_base() {
        let transport = HttpTransport::new(&config("https://moyun.example.com/")).unwrap();
        assert_eq!(transport.base_url(), "https://moyun.example.com");
        assert_eq!(
            transport.url("users/u1/docs/index").unwrap(),
            "https://moyun.example.com/users/u1/docs/index.json"
        );
    }

    #[test]
    fn rejects_non_http_base_urls() {
        let error = HttpTransport::new(&config("ftp://moyun.example.com")).unwrap_err();
        assert!(matches!(error, RemoteError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_reserved_characters_in_paths() {
        let transport = HttpTransport::new(&config("https://moyun.example.com")).unwrap();
        assert!(matches!(
            transport.url("users/u1/docs/a.b"),
            Err(RemoteError::InvalidPath(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transport_errors_do_not_leak_token() {
        let transport = HttpTransport::new(&config("http://127.0.0.1:9")).unwrap();
        let error = transport.get("users/u1/settings").await.unwrap_err();

        let message = error.to_string();
        assert!(!message.contains("secret-token"), "{message}");
        assert!(!message.contains("auth="), "{message}");
        let wrapped = crate::Error::from(error).to_string();
        assert!(!wrapped.contains("secret-token"), "{wrapped}");
    }

    #[test]
    fn debug_redacts_token() {
        let transport = HttpTransport::new(&config("https://moyun.example.com")).unwrap();
        let debug = format!("{transport:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn parse_api_error_prefers_error_field() {
        let message = parse_api_error(StatusCode::BAD_REQUEST, r#"{"error":"Invalid data"}"#);
        assert_eq!(message, "Invalid data (400)");
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "HTTP 500"
        );
    }
}
