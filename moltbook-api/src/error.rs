use anyhow::Context;
use serde_json::json;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Content must not be empty")]
    EmptyContent,

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid agent name {0:?}")]
    InvalidName(String),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::EmptyContent => StatusCode::BAD_REQUEST,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::Http { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "success": false,
                "error": "unknown",
                "message": msg,
            }),
            Error::Unauthorized => json!({
                "success": false,
                "error": "unauthorized",
                "message": "missing or invalid api key",
            }),
            Error::NotFound => json!({
                "success": false,
                "error": "not-found",
                "message": "not found",
            }),
            Error::EmptyContent => json!({
                "success": false,
                "error": "empty-content",
                "message": "content must not be empty",
            }),
            Error::NullByteInString(s) => json!({
                "success": false,
                "error": "null-byte",
                "message": "there was a null byte in argument string",
                "string": s,
            }),
            Error::InvalidName(n) => json!({
                "success": false,
                "error": "invalid-name",
                "message": "agent names are 3-30 characters of letters, digits, '_' or '-'",
                "name": n,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "success": false,
                "error": "conflict-name",
                "message": "name already used",
                "name": n,
            }),
            Error::Http { message, .. } => json!({
                "success": false,
                "error": "http",
                "message": message,
            }),
        })
        .expect("serializing error contents")
    }

    /// Recover an error from a non-success response.
    ///
    /// Bodies this crate produced round-trip to the same variant; anything else
    /// becomes `Error::Http` carrying the server's `message` or free-text `error`
    /// (or `HTTP <status>`).
    pub fn parse(status: u16, body: &[u8]) -> Error {
        match Self::parse_known(body) {
            Ok(Some(e)) => e,
            _ => Error::Http {
                status,
                message: Self::message_of(body).unwrap_or_else(|| format!("HTTP {status}")),
            },
        }
    }

    const TAGS: &'static [&'static str] = &[
        "unknown",
        "unauthorized",
        "not-found",
        "empty-content",
        "null-byte",
        "invalid-name",
        "conflict-name",
        "http",
    ];

    /// `message`, else a free-text `error` that is not one of our tags
    fn message_of(body: &[u8]) -> Option<String> {
        let data: serde_json::Value = serde_json::from_slice(body).ok()?;
        let text = |name: &str| data.get(name).and_then(|m| m.as_str());
        text("message")
            .or_else(|| text("error").filter(|e| !Self::TAGS.contains(e)))
            .map(String::from)
    }

    fn parse_known(body: &[u8]) -> anyhow::Result<Option<Error>> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let field = |name: &str| {
            data.get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
                .with_context(|| format!("error body has no string field {name:?}"))
        };
        Ok(Some(match data.get("error").and_then(|t| t.as_str()) {
            Some("unknown") => Error::Unknown(field("message").unwrap_or_default()),
            Some("unauthorized") => Error::Unauthorized,
            Some("not-found") => Error::NotFound,
            Some("empty-content") => Error::EmptyContent,
            Some("null-byte") => Error::NullByteInString(field("string")?),
            Some("invalid-name") => Error::InvalidName(field("name")?),
            Some("conflict-name") => Error::NameAlreadyUsed(field("name")?),
            _ => return Ok(None),
        }))
    }
}
