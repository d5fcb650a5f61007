use anyhow::Context;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::cli::{
    forge::http_client::{Auth, HttpClient, WithAuth, WithHttpStatus},
    pr::{CreatePrOptions, Pr, UpdatePrOptions},
};

// =============================================================================
// Domain Types
// =============================================================================

/// A repository on a Gitea server together with the token used to access it.
pub struct RepoContext<'a> {
    /// API root, e.g. `https://gitea.example.com/api/v1`.
    pub api_url: String,
    pub token: &'a str,
    pub owner: &'a str,
    pub repo: &'a str,
}

impl RepoContext<'_> {
    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{path}", self.api_url, self.owner, self.repo)
    }
}

/// Gitea API response for access tokens.
/// https://docs.gitea.com/api/#tag/user/operation/userCreateToken
#[derive(Debug, Deserialize)]
pub struct GiteaToken {
    pub name: String,
    pub sha1: String,
}

/// Gitea API response for pull requests.
/// https://docs.gitea.com/api/#tag/repository/operation/repoListPullRequests
#[derive(Debug, Deserialize)]
struct GiteaPullRequest {
    number: u64,
    title: String,
    user: GiteaUser,
    html_url: String,
    head: GiteaPrRef,
    base: GiteaPrRef,
}

impl From<GiteaPullRequest> for Pr {
    fn from(pr: GiteaPullRequest) -> Self {
        Pr {
            number: pr.number,
            title: pr.title,
            author: pr.user.login,
            url: pr.html_url,
            head: pr.head.ref_name,
            base: pr.base.ref_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GiteaUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GiteaPrRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Serialize)]
struct MergePrBody<'a> {
    #[serde(rename = "do")]
    merge_style: &'a str,
    force_merge: bool,
}

#[derive(Serialize)]
struct EditPrBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

// =============================================================================
// Command Logic
// =============================================================================

pub fn create_token(
    http_client: &HttpClient,
    api_url: &str,
    user: &str,
    password: &str,
    token_name: &str,
) -> anyhow::Result<GiteaToken> {
    let url = format!("{api_url}/users/{user}/tokens");

    http_client
        .post(&url)
        .with_auth(&Auth::Basic { user, password })
        .json(&serde_json::json!({ "name": token_name }))
        .send()
        .context("Network request failed while creating a Gitea token")?
        .with_http_status(StatusCode::CREATED)?
        .json()
        .context("Failed to parse Gitea API response")
}

pub fn delete_token(
    http_client: &HttpClient,
    api_url: &str,
    user: &str,
    password: &str,
    token_name: &str,
) -> anyhow::Result<()> {
    let url = format!("{api_url}/users/{user}/tokens/{token_name}");

    http_client
        .delete(&url)
        .with_auth(&Auth::Basic { user, password })
        .send()
        .context("Network request failed while deleting a Gitea token")?
        .with_http_status(StatusCode::NO_CONTENT)?;

    Ok(())
}

pub fn get_open_prs(http_client: &HttpClient, repo: &RepoContext) -> anyhow::Result<Vec<Pr>> {
    let prs: Vec<GiteaPullRequest> = http_client
        .get(&repo.url("/pulls"))
        .with_auth(&Auth::Token(repo.token))
        .query(&[("state", "open")])
        .send()
        .context("Network request failed while fetching pull requests from Gitea")?
        .with_http_status(StatusCode::OK)?
        .json()
        .context("Failed to parse Gitea API response")?;

    Ok(prs.into_iter().map(Pr::from).collect())
}

pub fn create_pr(
    http_client: &HttpClient,
    repo: &RepoContext,
    options: &CreatePrOptions,
) -> anyhow::Result<Pr> {
    let request_body = serde_json::json!({
        "base": options.base,
        "head": options.head,
        "title": options.title,
    });

    let pr: GiteaPullRequest = http_client
        .post(&repo.url("/pulls"))
        .with_auth(&Auth::Token(repo.token))
        .json(&request_body)
        .send()
        .context("Network request failed while creating pull request on Gitea")?
        .with_http_status(StatusCode::CREATED)?
        .json()
        .context("Failed to parse Gitea API response")?;

    Ok(pr.into())
}

/// Squash-merges pull request `number`.
pub fn merge_pr(
    http_client: &HttpClient,
    repo: &RepoContext,
    number: u64,
    force: bool,
) -> anyhow::Result<()> {
    http_client
        .post(&repo.url(&format!("/pulls/{number}/merge")))
        .with_auth(&Auth::Token(repo.token))
        .json(&MergePrBody {
            merge_style: "squash",
            force_merge: force,
        })
        .send()
        .context("Network request failed while merging pull request on Gitea")?
        .with_http_status(StatusCode::OK)?;

    Ok(())
}

pub fn update_pr(
    http_client: &HttpClient,
    repo: &RepoContext,
    number: u64,
    options: &UpdatePrOptions,
) -> anyhow::Result<()> {
    let body = EditPrBody {
        title: options.title,
        state: options.close.then_some("closed"),
    };

    http_client
        .patch(&repo.url(&format!("/pulls/{number}")))
        .with_auth(&Auth::Token(repo.token))
        .json(&body)
        .send()
        .context("Network request failed while updating pull request on Gitea")?
        .with_http_status(StatusCode::CREATED)?;

    Ok(())
}

pub fn delete_branch(
    http_client: &HttpClient,
    repo: &RepoContext,
    branch: &str,
) -> anyhow::Result<()> {
    http_client
        .delete(&repo.url(&format!("/branches/{branch}")))
        .with_auth(&Auth::Token(repo.token))
        .send()
        .with_context(|| format!("Network request failed while deleting branch '{branch}'"))?
        .with_http_status(StatusCode::NO_CONTENT)?;

    Ok(())
}
