//! Optional HTTP Basic authentication in front of the bridge.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;

use crate::config::schema::BasicAuthConfig;

/// Expected `Authorization` value, precomputed once.
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    expected: String,
}

impl BasicCredentials {
    pub fn new(config: &BasicAuthConfig) -> Self {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", config.login, config.passcode));
        Self {
            expected: format!("Basic {}", token),
        }
    }

    pub fn matches(&self, authorization: Option<&str>) -> bool {
        authorization.is_some_and(|value| value == self.expected)
    }
}

pub async fn basic_auth_middleware(
    State(credentials): State<Arc<BasicCredentials>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if credentials.matches(authorization) {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rejected request with bad credentials");
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"broker-bridge\""),
        )],
        "Unauthorized",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_encoded_credentials() {
        let credentials = BasicCredentials::new(&BasicAuthConfig {
            login: "Aladdin".into(),
            passcode: "open sesame".into(),
        });
        assert!(credentials.matches(Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")));
        assert!(!credentials.matches(Some("Basic QWxhZGRpbjp3cm9uZw==")));
        assert!(!credentials.matches(None));
    }
}
