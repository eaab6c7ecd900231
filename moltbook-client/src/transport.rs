use async_trait::async_trait;

use crate::api::API_PREFIX;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiRequest {
    pub method: Method,

    /// Path below the API prefix, eg. `/posts/123`, query string included
    pub path: String,

    /// JSON body
    pub body: Option<Vec<u8>>,

    /// Sent as a bearer token when set
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Whatever actually carries requests to the server
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// `host` is eg. `https://example.org`, the API prefix gets appended
    pub fn new(host: &str) -> ReqwestTransport {
        ReqwestTransport::with_client(reqwest::Client::new(), host)
    }

    pub fn with_client(client: reqwest::Client, host: &str) -> ReqwestTransport {
        ReqwestTransport {
            client,
            base_url: format!("{}{}", host.trim_end_matches('/'), API_PREFIX),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, req.path);
        let mut builder = match req.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Delete => self.client.delete(url),
        }
        .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(key) = &req.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();
        Ok(ApiResponse { status, body })
    }
}
