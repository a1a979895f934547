//! HTTP session shared by the handshake requests and the WebSocket upgrade.
//!
//! A [`Session`] bundles a `reqwest::Client` with the headers, credentials
//! and cookies that must accompany every request to the hub, including the
//! socket upgrade, which `reqwest` does not perform.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderName, HeaderValue};

use crate::error::SignalRError;

/// Credentials attached to every request as an `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Bearer(String),
    Basic {
        username: String,
        password: Option<String>,
    },
}

impl Auth {
    fn header_value(&self) -> Result<HeaderValue, SignalRError> {
        let raw = match self {
            Self::Bearer(token) => format!("Bearer {token}"),
            Self::Basic { username, password } => {
                let pair = format!("{username}:{}", password.as_deref().unwrap_or_default());
                format!("Basic {}", STANDARD.encode(pair))
            }
        };
        let mut value = HeaderValue::from_str(&raw)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
            Self::Basic { username, password } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Pre-configured HTTP session.
#[derive(Clone, Debug, Default)]
pub struct Session {
    client: reqwest::Client,
    headers: HeaderMap,
    auth: Option<Auth>,
    cookies: Vec<(String, String)>,
}

impl Session {
    /// Creates a session on top of an existing `reqwest` client.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }

    /// Adds a header sent with every request, replacing any previous value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, SignalRError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(self)
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Adds a cookie, replacing a previous cookie with the same name.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        match self.cookies.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.cookies.push((name, value)),
        }
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Returns the cookie jar as a `Cookie` header value: `a=1; b=2`.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Returns the headers every request carries: configured headers,
    /// `Authorization` and `Cookie`.
    pub fn request_headers(&self) -> Result<HeaderMap, SignalRError> {
        let mut headers = self.headers.clone();
        if let Some(auth) = &self.auth {
            headers.insert(AUTHORIZATION, auth.header_value()?);
        }
        if !self.cookies.is_empty() {
            headers.insert(COOKIE, HeaderValue::from_str(&self.cookie_header())?);
        }
        Ok(headers)
    }

    /// Starts a GET request carrying the session headers.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, SignalRError> {
        Ok(self.client.get(url).headers(self.request_headers()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let session = Session::default()
            .with_cookie("a", "1")
            .with_cookie("b", "2")
            .with_cookie("a", "3");
        assert_eq!(session.cookie_header(), "a=3; b=2");
    }

    #[test]
    fn test_request_headers() {
        let session = Session::default()
            .with_header("X-Client", "tests")
            .unwrap()
            .with_auth(Auth::Bearer("secret".into()))
            .with_cookie("session", "abc");
        let headers = session.request_headers().unwrap();
        assert_eq!(headers["x-client"], "tests");
        assert_eq!(headers[AUTHORIZATION], "Bearer secret");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(headers[COOKIE], "session=abc");
    }

    #[test]
    fn test_basic_auth() {
        let session = Session::default().with_auth(Auth::Basic {
            username: "user".into(),
            password: Some("pass".into()),
        });
        let headers = session.request_headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let session = Session::default().with_auth(Auth::Bearer("secret".into()));
        assert!(!format!("{session:?}").contains("secret"));

        let basic = Auth::Basic {
            username: "user".into(),
            password: Some("hunter2".into()),
        };
        let rendered = format!("{basic:?}");
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_no_cookie_header_without_cookies() {
        let headers = Session::default().request_headers().unwrap();
        assert!(headers.get(COOKIE).is_none());
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_invalid_header() {
        assert!(matches!(
            Session::default().with_header("bad header", "x"),
            Err(SignalRError::InvalidHeaderName(_))
        ));
    }
}
