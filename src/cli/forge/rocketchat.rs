use anyhow::Context;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::cli::forge::http_client::{Auth, HttpClient, WithAuth, WithHttpStatus};

// =============================================================================
// Domain Types
// =============================================================================

/// An authenticated Rocketchat session.
pub struct ChatContext<'a> {
    /// API root, e.g. `https://chat.example.com/api/v1`.
    pub api_url: String,
    pub user_id: &'a str,
    pub token: &'a str,
}

/// Rocketchat API response for logins.
/// https://developer.rocket.chat/apidocs/login-with-username-and-password
#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    #[serde(rename = "authToken")]
    pub auth_token: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Serialize)]
struct PostMessageBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    success: bool,
}

// =============================================================================
// Command Logic
// =============================================================================

pub fn login(
    http_client: &HttpClient,
    api_url: &str,
    user: &str,
    password: &str,
) -> anyhow::Result<LoginData> {
    let response: LoginResponse = http_client
        .post(&format!("{api_url}/login"))
        .json(&serde_json::json!({ "user": user, "password": password }))
        .send()
        .context("Network request failed while logging in to Rocketchat")?
        .with_http_status(StatusCode::OK)?
        .json()
        .context("Failed to parse Rocketchat API response")?;

    if response.status != "success" {
        anyhow::bail!(
            "Unexpected Rocketchat login status: {} {}",
            response.status,
            response.message.unwrap_or_default()
        );
    }

    response
        .data
        .context("Rocketchat login response is missing the session data")
}

/// Posts `text` to `channel`, or to the user's default room if `channel` is
/// empty.
pub fn post_message(
    http_client: &HttpClient,
    chat: &ChatContext,
    channel: &str,
    text: &str,
) -> anyhow::Result<()> {
    let body = PostMessageBody {
        channel: (!channel.is_empty()).then_some(channel),
        text,
    };
    let response: PostMessageResponse = http_client
        .post(&format!("{}/chat.postMessage", chat.api_url))
        .with_auth(&Auth::Rocketchat {
            user_id: chat.user_id,
            token: chat.token,
        })
        .json(&body)
        .send()
        .context("Network request failed while posting to Rocketchat")?
        .with_http_status(StatusCode::OK)?
        .json()
        .context("Failed to parse Rocketchat API response")?;

    if !response.success {
        anyhow::bail!("Rocketchat didn't accept the message");
    }

    Ok(())
}
