use exttable_config::shared::ListenerConfig;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Url, redirect};
use serde_json::Value;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::ListenerResource;

/// Marker splitting a resource location into base address and relative path.
pub const API_SEPARATOR: &str = "/API/";

/// Builds the request URL for the events following `watermark`.
///
/// The location is split at [`API_SEPARATOR`]; the relative part keeps the separator, loses a
/// leading backslash and any trailing slash, and gains the paging parameters.
pub fn build_listener_url(location: &str, watermark: u64, max_events: u32) -> EtlResult<Url> {
    let location = location.trim();
    let Some(split) = location.find(API_SEPARATOR) else {
        bail!(
            ErrorKind::InvalidData,
            "Listener location has no API path",
            format!("'{location}' does not contain '{API_SEPARATOR}'")
        );
    };

    let (base, relative) = location.split_at(split);
    if base.is_empty() {
        bail!(
            ErrorKind::InvalidData,
            "Listener location has no base address",
            format!("'{location}' starts with '{API_SEPARATOR}'")
        );
    }

    let relative = relative.strip_prefix('\\').unwrap_or(relative);
    let relative = relative
        .strip_suffix('/')
        .or_else(|| relative.strip_suffix('\\'))
        .unwrap_or(relative);
    let mut path = if relative.starts_with('/') {
        relative.to_owned()
    } else {
        format!("/{relative}")
    };

    path.push(if path.contains('?') { '&' } else { '?' });
    path.push_str(&format!(
        "firstEvent={}&maxEventsPerCall={max_events}",
        watermark.saturating_add(1)
    ));

    let base = base.trim_end_matches('/');
    Url::parse(&format!("{base}{path}")).map_err(|err| {
        etl_error!(
            ErrorKind::InvalidData,
            "Listener location is not a valid URL",
            format!("'{location}': {err}")
        )
    })
}

/// HTTP client polling listener endpoints.
///
/// Redirects are not followed and every request is bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct ListenerClient {
    client: reqwest::Client,
    max_events_per_call: u32,
}

impl ListenerClient {
    pub fn new(config: &ListenerConfig) -> EtlResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .redirect(redirect::Policy::none())
            .default_headers(headers)
            .build()
            .map_err(|err| {
                etl_error!(
                    ErrorKind::ConfigError,
                    "Failed to build listener HTTP client",
                    source: err
                )
            })?;

        Ok(Self {
            client,
            max_events_per_call: config.max_events_per_call,
        })
    }

    /// Fetches the events following `watermark` as a JSON array or single object.
    ///
    /// An empty body means there is nothing new and yields `null`.
    pub async fn fetch(&self, listener: &ListenerResource, watermark: u64) -> EtlResult<Value> {
        let url = build_listener_url(
            &listener.resource_location,
            watermark,
            self.max_events_per_call,
        )?;
        debug!(listener = %listener.name, %url, "fetching listener events");

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                ErrorKind::TransportError,
                "Listener returned an error status",
                format!("listener '{}' answered {status}", listener.name)
            );
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&body).map_err(|err| {
            etl_error!(
                ErrorKind::TransportError,
                "Listener returned malformed JSON",
                format!("listener '{}': {err}", listener.name)
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use super::*;
    use crate::types::{ObjectState, ResourceId};

    #[test]
    fn url_appends_paging_after_the_api_path() {
        let url = build_listener_url("https://host:8443/API/Listener/7/", 41, 100).unwrap();
        assert_eq!(
            url.as_str(),
            "https://host:8443/API/Listener/7?firstEvent=42&maxEventsPerCall=100"
        );
    }

    #[test]
    fn url_extends_an_existing_query() {
        let url = build_listener_url(" http://host/API/Events?feed=a ", 0, 25).unwrap();
        assert_eq!(
            url.as_str(),
            "http://host/API/Events?feed=a&firstEvent=1&maxEventsPerCall=25"
        );
    }

    #[test]
    fn url_requires_the_separator_and_a_base() {
        let missing = build_listener_url("http://host/api/events", 0, 100).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::InvalidData);

        let no_base = build_listener_url("/API/events", 0, 100).unwrap_err();
        assert_eq!(no_base.kind(), ErrorKind::InvalidData);
    }

    /// Serves one canned response and reports the request head it received.
    async fn serve_once(response: String, delay: Duration) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = socket.read(&mut buffer).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..read]);
            }
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());

            tokio::time::sleep(delay).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        (format!("http://{address}/API/Listener/3"), rx)
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn resource(location: String) -> ListenerResource {
        ListenerResource {
            id: ResourceId(3),
            name: "orders-feed".to_owned(),
            resource_location: location,
            state: ObjectState::active(),
        }
    }

    fn client(timeout_secs: u64) -> ListenerClient {
        ListenerClient::new(&ListenerConfig {
            request_timeout_secs: timeout_secs,
            max_events_per_call: 100,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_the_json_body() {
        let body = r#"[{"EventId": 5, "id": {"Value": 1}}]"#;
        let (location, request) =
            serve_once(http_response("200 OK", body), Duration::ZERO).await;

        let value = client(5).fetch(&resource(location), 4).await.unwrap();

        assert_eq!(value, json!([{"EventId": 5, "id": {"Value": 1}}]));
        let request = request.await.unwrap();
        assert!(request.starts_with(
            "GET /API/Listener/3?firstEvent=5&maxEventsPerCall=100 HTTP/1.1"
        ));
        assert!(request.to_ascii_lowercase().contains("accept: application/json"));
    }

    #[tokio::test]
    async fn empty_body_is_null() {
        let (location, _) = serve_once(http_response("200 OK", ""), Duration::ZERO).await;

        let value = client(5).fetch(&resource(location), 0).await.unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn error_status_is_a_transport_error() {
        let (location, _) =
            serve_once(http_response("503 Service Unavailable", "{}"), Duration::ZERO).await;

        let err = client(5).fetch(&resource(location), 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let response = "HTTP/1.1 302 Found\r\nLocation: http://127.0.0.1:9/elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        let (location, _) = serve_once(response.to_owned(), Duration::ZERO).await;

        let err = client(5).fetch(&resource(location), 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }

    #[tokio::test]
    async fn malformed_json_is_a_transport_error() {
        let (location, _) =
            serve_once(http_response("200 OK", "[{not json"), Duration::ZERO).await;

        let err = client(5).fetch(&resource(location), 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }

    #[tokio::test]
    async fn slow_listener_times_out() {
        let (location, _) =
            serve_once(http_response("200 OK", "[]"), Duration::from_secs(3)).await;

        let err = client(1).fetch(&resource(location), 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }
}
