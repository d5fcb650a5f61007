//! The `pr` commands.

use anyhow::Context;
use clap::ValueEnum;
use serde::Serialize;
use tracing::debug;

use crate::{
    cli::{
        Session,
        config::{Config, RocketchatConfig},
        forge::{
            HttpClient,
            gitea::{self, RepoContext},
            rocketchat::{self, ChatContext},
        },
        input::Terminal,
        option::{OptionDefault, OptionDescriptor, OptionValue},
    },
    git,
    io::{self, OutputFormat},
};

const DEFAULT_REMOTE: &str = "origin";
const TEXT_FORMAT: &str = "text";
const PR_FIELDS: [&str; 6] = ["number", "title", "author", "head", "base", "url"];

// =============================================================================
// Domain Types
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pr {
    /// The pull request number (e.g., #42).
    pub number: u64,
    pub title: String,
    /// The username of the pull request author.
    pub author: String,
    /// The web URL to view this pull request.
    pub url: String,
    /// The source branch.
    pub head: String,
    /// The target branch.
    pub base: String,
}

pub struct CreatePrOptions<'a> {
    pub title: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

pub struct UpdatePrOptions<'a> {
    pub title: Option<&'a str>,
    pub close: bool,
}

/// Values taken from the git working copy to seed option defaults. Each
/// field is empty if it couldn't be determined.
#[derive(Debug, Default)]
pub struct WorkingCopy {
    pub branch: String,
    pub owner: String,
    pub repo: String,
}

impl WorkingCopy {
    pub fn detect() -> Self {
        let branch = git::get_current_branch()
            .inspect_err(|e| debug!("no current branch: {e:#}"))
            .unwrap_or_default();
        let (owner, repo) = git::get_remote_repo(DEFAULT_REMOTE)
            .inspect_err(|e| debug!("no usable remote: {e:#}"))
            .map(|remote| (remote.owner, remote.name))
            .unwrap_or_default();

        Self {
            branch,
            owner,
            repo,
        }
    }
}

// =============================================================================
// Command Options
// =============================================================================

/// Owner and repository. The configured defaults win over the ones derived
/// from the `origin` remote.
pub fn repo_options(config: Option<&Config>, working_copy: &WorkingCopy) -> Vec<OptionDescriptor> {
    let owner = config
        .map(|c| c.gitea.default_repo_owner.as_str())
        .filter(|owner| !owner.is_empty())
        .unwrap_or(working_copy.owner.as_str());
    let repo = config
        .map(|c| c.gitea.default_repo_name.as_str())
        .filter(|repo| !repo.is_empty())
        .unwrap_or(working_copy.repo.as_str());

    vec![
        OptionDescriptor::with_default("repo owner", "", &["o", "owner"], owner),
        OptionDescriptor::with_default("repo name", "", &["r", "repo"], repo),
    ]
}

pub fn new_pr_options(config: Option<&Config>, working_copy: &WorkingCopy) -> Vec<OptionDescriptor> {
    let base = config.map_or("", |c| c.gitea.default_base_for_pr.as_str());
    let mut options = repo_options(config, working_copy);

    options.extend([
        OptionDescriptor::with_default(
            "head branch",
            "source branch in PR",
            &["h", "head"],
            &working_copy.branch,
        ),
        OptionDescriptor::with_default("base branch", "target branch in PR", &["b", "base"], base),
        OptionDescriptor::with_default("pr title", "", &["t", "title"], &working_copy.branch),
        OptionDescriptor::switch(&["w", "wip"], "work in progress [default: false]"),
        OptionDescriptor::switch(&["d", "dry"], "dry run [default: false]"),
        notify_option(config),
        OptionDescriptor::switch(
            &["n", "nohdr"],
            "dont use default_header field from config [default: false]",
        ),
        OptionDescriptor::text(&["f", "footer"], "text below message [default: empty]")
            .no_prompt()
            .optional(true),
    ]);

    options
}

pub fn list_pr_options(config: Option<&Config>, working_copy: &WorkingCopy) -> Vec<OptionDescriptor> {
    let mut options = repo_options(config, working_copy);

    options.push(OptionDescriptor::with_default(
        "output format (text, tsv, csv, json)",
        "",
        &["format"],
        TEXT_FORMAT,
    ));

    options
}

pub fn merge_pr_options(config: Option<&Config>, working_copy: &WorkingCopy) -> Vec<OptionDescriptor> {
    let mut options = repo_options(config, working_copy);

    options.extend([
        find_pr_option(),
        OptionDescriptor::switch(&["rm", "del"], "Remove branch"),
        OptionDescriptor::switch(&["f", "force"], "Force merge"),
        notify_option(config),
    ]);

    options
}

pub fn update_pr_options(config: Option<&Config>, working_copy: &WorkingCopy) -> Vec<OptionDescriptor> {
    let mut options = repo_options(config, working_copy);

    options.extend([
        find_pr_option(),
        OptionDescriptor::switch(&["c", "close"], "close pull request"),
        OptionDescriptor::text(&["rename"], "Change title")
            .no_prompt()
            .optional(true),
    ]);

    options
}

// =============================================================================
// Command Logic
// =============================================================================

/// Execute the `new pr` command.
pub fn new_pr(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let [
        owner,
        repo,
        head,
        base,
        title,
        wip,
        dry,
        notify_channel,
        no_header,
        footer,
    ] = values
    else {
        anyhow::bail!("new pr: unexpected number of option values");
    };
    let config = session.config(true)?;
    let mut title = match title.as_str() {
        "" => head.value.clone(),
        title => title.to_string(),
    };

    if wip.present {
        title = format!("WIP: {title}");
    }

    println!(
        "Creating pr for {}/{} {}->{} with title: '{title}'",
        owner.value, repo.value, head.value, base.value
    );

    if dry.present {
        return Ok(());
    }

    let http_client = HttpClient::new();
    let repo_context = repo_context(config, owner, repo);
    let pr = gitea::create_pr(
        &http_client,
        &repo_context,
        &CreatePrOptions {
            title: &title,
            head: &head.value,
            base: &base.value,
        },
    )?;

    println!("{}", pr.url);

    if config.rocketchat.enabled {
        let message = review_request_message(
            &config.rocketchat,
            &pr,
            no_header.present,
            footer.as_str(),
        );

        notify(&http_client, &config.rocketchat, notify_channel.as_str(), &message)?;
    }

    Ok(())
}

/// Execute the `list pr` command.
pub fn list_prs(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let [owner, repo, format] = values else {
        anyhow::bail!("list pr: unexpected number of option values");
    };
    let config = session.config(true)?;
    let prs = gitea::get_open_prs(&HttpClient::new(), &repo_context(config, owner, repo))?;
    let output = format_prs(&prs, format.as_str())?;

    if !output.is_empty() {
        println!("{output}");
    }

    Ok(())
}

/// Execute the `merge pr` command.
pub fn merge_pr(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let [owner, repo, title, remove_branch, force, notify_channel] = values else {
        anyhow::bail!("merge pr: unexpected number of option values");
    };
    let config = session.config(true)?.clone();
    let http_client = HttpClient::new();
    let repo_context = repo_context(&config, owner, repo);

    println!("merging pr with title: '{}'", title.value);

    let prs = gitea::get_open_prs(&http_client, &repo_context)?;
    let pr = find_pr(&prs, title.as_str())?;

    gitea::merge_pr(&http_client, &repo_context, pr.number, force.present)?;

    let remove_branch = remove_branch.present
        || ask_yes_no(session.terminal, &format!("remove branch {}?", pr.head))?;

    if remove_branch {
        gitea::delete_branch(&http_client, &repo_context, &pr.head)?;
    }

    if config.rocketchat.enabled {
        notify(
            &http_client,
            &config.rocketchat,
            notify_channel.as_str(),
            &merged_message(pr),
        )?;
    }

    Ok(())
}

/// Execute the `update pr` command.
pub fn update_pr(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let [owner, repo, title, close, rename] = values else {
        anyhow::bail!("update pr: unexpected number of option values");
    };
    let config = session.config(true)?;

    if !close.present && rename.value.is_empty() {
        eprintln!("Warning: Neither --close nor --rename was given. Nothing to update.");
        return Ok(());
    }

    let http_client = HttpClient::new();
    let repo_context = repo_context(config, owner, repo);

    println!("updating pr with title: '{}'", title.value);

    let prs = gitea::get_open_prs(&http_client, &repo_context)?;
    let pr = find_pr(&prs, title.as_str())?;

    gitea::update_pr(
        &http_client,
        &repo_context,
        pr.number,
        &UpdatePrOptions {
            title: (!rename.value.is_empty()).then_some(rename.as_str()),
            close: close.present,
        },
    )
}

// =============================================================================
// Private Helpers
// =============================================================================

/// The notification channel. Only asked for when Rocketchat is enabled and
/// no default channel is configured.
fn notify_option(config: Option<&Config>) -> OptionDescriptor {
    let (enabled, channel) = config.map_or((false, ""), |c| {
        (
            c.rocketchat.enabled,
            c.rocketchat.default_notify_channel.as_str(),
        )
    });
    let optional = !enabled || !channel.is_empty();
    let mut option = OptionDescriptor::text(&["notify"], "Notification channel for rocketchat")
        .optional(optional)
        .default_value(OptionDefault::Constant(channel.to_string()));

    option.skip_prompt = optional;

    option
}

fn find_pr_option() -> OptionDescriptor {
    OptionDescriptor::text(&["t", "title"], "PR title (current branch name if empty)")
        .no_prompt()
        .default_value(OptionDefault::Deferred(Box::new(git::get_current_branch)))
}

fn repo_context<'a>(
    config: &'a Config,
    owner: &'a OptionValue,
    repo: &'a OptionValue,
) -> RepoContext<'a> {
    RepoContext {
        api_url: config.gitea.remote_info.api_url(),
        token: &config.gitea.token_sha1,
        owner: owner.as_str(),
        repo: repo.as_str(),
    }
}

fn find_pr<'a>(prs: &'a [Pr], title: &str) -> anyhow::Result<&'a Pr> {
    prs.iter()
        .find(|pr| pr.title == title)
        .with_context(|| format!("No open pull request with title '{title}' found"))
}

fn format_prs(prs: &[Pr], format: &str) -> anyhow::Result<String> {
    if format == TEXT_FORMAT {
        return Ok(prs
            .iter()
            .map(|pr| {
                format!(
                    "PR: {}->{} index={}, title={}, user={}, url={}",
                    pr.head, pr.base, pr.number, pr.title, pr.author, pr.url
                )
            })
            .collect::<Vec<_>>()
            .join("\n"));
    }

    let output_format = OutputFormat::from_str(format, true)
        .map_err(|_| anyhow::anyhow!("Unknown output format '{format}'"))?;

    io::format(prs, &PR_FIELDS, &output_format)
}

fn review_request_message(
    rocketchat: &RocketchatConfig,
    pr: &Pr,
    no_header: bool,
    footer: &str,
) -> String {
    let mut message = String::new();

    if !no_header {
        message.push_str(&rocketchat.default_header);
    }

    message.push_str(&format!(
        "Requesting review for PR: [{}]({}) (*{}* -> *{}*)",
        pr.title, pr.url, pr.head, pr.base
    ));

    if !footer.is_empty() {
        message.push('\n');
        message.push_str(footer);
    }

    message
}

fn merged_message(pr: &Pr) -> String {
    format!(
        "[{}]({}) (*{}* -> *{}*) has been merged",
        pr.title, pr.url, pr.head, pr.base
    )
}

fn notify(
    http_client: &HttpClient,
    rocketchat: &RocketchatConfig,
    channel: &str,
    message: &str,
) -> anyhow::Result<()> {
    let chat = ChatContext {
        api_url: rocketchat.remote_info.api_url(),
        user_id: &rocketchat.user_id,
        token: &rocketchat.token,
    };

    rocketchat::post_message(http_client, &chat, channel, message)
        .context("Failed to post notification to Rocketchat")
}

/// Asks until the answer is exactly `y` or `n`. End of input counts as `n`.
fn ask_yes_no(terminal: &mut dyn Terminal, question: &str) -> anyhow::Result<bool> {
    loop {
        terminal.print(&format!("{question} [y/n]: "))?;

        let Some(answer) = terminal.read_line()? else {
            return Ok(false);
        };

        match answer.trim_end_matches(['\r', '\n']) {
            "y" => return Ok(true),
            "n" => return Ok(false),
            _ => continue,
        }
    }
}
