//! `HttpProxy`: composes and sends the outbound request to
//! `baseUrl + targetPath[?query]`, enforces size limits before forwarding,
//! and maps failures to the gateway's problem-details taxonomy.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::net::IpAddr;
use thiserror::Error;

use crate::config::{LimitsConfig, ProxyTimeoutsConfig};

use super::headers::{apply_forwarded_headers, strip_outbound_headers, strip_response_headers, total_header_size, ForwardedHeaderInputs};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("request payload exceeds the configured size limit")]
    PayloadTooLarge,
    #[error("request headers exceed the configured size limit")]
    HeaderTooLarge,
    #[error("upstream request timed out")]
    GatewayTimeout,
    #[error("upstream is unreachable or returned an invalid response: {0}")]
    BadGateway(String),
}

pub struct ProxyRequest<'a> {
    pub method: Method,
    pub base_url: &'a str,
    pub target_path: &'a str,
    pub query: Option<&'a str>,
    pub inbound_headers: HeaderMap,
    pub body: Bytes,
    pub client_ip: IpAddr,
    pub scheme: &'a str,
    pub peer_is_trusted_proxy: bool,
    pub bearer_token: Option<String>,
    pub api_key_id: Option<String>,
    pub api_key_name: Option<String>,
}

pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct HttpProxy {
    client: reqwest::Client,
    limits: LimitsConfig,
    timeouts: ProxyTimeoutsConfig,
}

impl HttpProxy {
    pub fn new(limits: LimitsConfig, timeouts: ProxyTimeoutsConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| ProxyError::BadGateway(e.to_string()))?;
        Ok(Self { client, limits, timeouts })
    }

    pub async fn forward(&self, req: ProxyRequest<'_>) -> Result<ProxyResponse, ProxyError> {
        self.validate_sizes(&req)?;

        let url = self.build_url(&req);
        let authority = authority_of(&req.base_url);

        let mut headers = req.inbound_headers.clone();
        strip_outbound_headers(&mut headers, req.bearer_token.is_some());

        apply_forwarded_headers(
            &mut headers,
            &req.inbound_headers,
            ForwardedHeaderInputs {
                client_ip: req.client_ip,
                scheme: req.scheme,
                host: &authority,
                peer_is_trusted_proxy: req.peer_is_trusted_proxy,
            },
        );
        headers.insert(http::header::HOST, HeaderValue::from_str(&authority).unwrap_or_else(|_| HeaderValue::from_static("")));

        if let Some(token) = &req.bearer_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(http::header::AUTHORIZATION, value);
            }
        }
        if let Some(key_id) = &req.api_key_id {
            if let Ok(value) = HeaderValue::from_str(key_id) {
                headers.insert("X-Aussie-Key-Id", value);
            }
        }
        if let Some(key_name) = &req.api_key_name {
            if let Ok(value) = HeaderValue::from_str(key_name) {
                headers.insert("X-Aussie-Key-Name", value);
            }
        }

        let total_timeout = self.timeouts.connect + self.timeouts.tls + self.timeouts.headers + self.timeouts.body;

        let response = self
            .client
            .request(req.method, &url)
            .headers(headers)
            .body(req.body)
            .timeout(total_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::GatewayTimeout
                } else {
                    ProxyError::BadGateway(e.to_string())
                }
            })?;

        let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut resp_headers = response.headers().clone();
        strip_response_headers(&mut resp_headers);

        let body = self.read_body_with_timeout(response).await?;

        Ok(ProxyResponse { status, headers: resp_headers, body })
    }

    async fn read_body_with_timeout(&self, response: reqwest::Response) -> Result<Bytes, ProxyError> {
        tokio::time::timeout(self.timeouts.body, response.bytes())
            .await
            .map_err(|_| ProxyError::GatewayTimeout)?
            .map_err(|e| ProxyError::BadGateway(e.to_string()))
    }

    fn validate_sizes(&self, req: &ProxyRequest<'_>) -> Result<(), ProxyError> {
        if req.body.len() as u64 > self.limits.max_body_size {
            return Err(ProxyError::PayloadTooLarge);
        }
        for (name, value) in req.inbound_headers.iter() {
            if (name.as_str().len() + value.len()) as u64 > self.limits.max_header_size {
                return Err(ProxyError::HeaderTooLarge);
            }
        }
        if total_header_size(&req.inbound_headers) as u64 > self.limits.max_total_headers_size {
            return Err(ProxyError::HeaderTooLarge);
        }
        Ok(())
    }

    fn build_url(&self, req: &ProxyRequest<'_>) -> String {
        let base = req.base_url.trim_end_matches('/');
        match req.query {
            Some(q) if !q.is_empty() => format!("{base}{}?{q}", req.target_path),
            _ => format!("{base}{}", req.target_path),
        }
    }
}

fn authority_of(base_url: &str) -> String {
    url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| match u.port() {
            Some(p) => format!("{h}:{p}"),
            None => h.to_string(),
        }))
        .unwrap_or_else(|| base_url.to_string())
}
