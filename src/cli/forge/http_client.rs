use reqwest::{
    Method, StatusCode,
    blocking::{RequestBuilder, Response},
};
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = std::env!("CARGO_PKG_NAME");

pub struct HttpClient {
    reqwest_client: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            reqwest_client: reqwest::blocking::Client::new(),
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!(%method, url, "sending request");

        self.reqwest_client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json; charset=utf-8")
    }
}

/// Credentials attached to a request.
pub enum Auth<'a> {
    /// Username and password, used to manage Gitea tokens.
    Basic { user: &'a str, password: &'a str },
    /// A Gitea access token.
    Token(&'a str),
    /// A Rocketchat session.
    Rocketchat { user_id: &'a str, token: &'a str },
}

pub trait WithAuth {
    fn with_auth(self, auth: &Auth) -> RequestBuilder;
}

impl WithAuth for RequestBuilder {
    fn with_auth(self, auth: &Auth) -> RequestBuilder {
        match auth {
            Auth::Basic { user, password } => self.basic_auth(user, Some(password)),
            Auth::Token(token) => self.header("Authorization", format!("token {token}")),
            Auth::Rocketchat { user_id, token } => self
                .header("X-Auth-Token", *token)
                .header("X-User-Id", *user_id),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid status code, expected {expected} got {actual};\n{body}")]
pub struct UnexpectedStatus {
    pub expected: u16,
    pub actual: u16,
    pub body: String,
}

pub trait WithHttpStatus {
    /// Fails with [`UnexpectedStatus`] unless the response has exactly the
    /// `expected` status.
    fn with_http_status(self, expected: StatusCode) -> anyhow::Result<Response>;
}

impl WithHttpStatus for Response {
    fn with_http_status(self, expected: StatusCode) -> anyhow::Result<Response> {
        let actual = self.status();

        debug!(%actual, %expected, "received response");

        if actual == expected {
            return Ok(self);
        }

        let body = match self.text() {
            Ok(body) if !body.is_empty() => body,
            _ => "<nothing in body>".to_string(),
        };

        Err(UnexpectedStatus {
            expected: expected.as_u16(),
            actual: actual.as_u16(),
            body,
        }
        .into())
    }
}

/// Joins a server base URL and API version into the API root, e.g.
/// `https://gitea.example.com/api/v1`.
pub fn api_url(base_url: &str, api_ver: &str) -> String {
    format!("{}/api/{api_ver}", base_url.trim_end_matches('/'))
}
