//! The configuration file and the `config` commands.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use dialoguer::Editor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::cli::{
    Session,
    forge::{HttpClient, api_url, gitea},
    option::{OptionDescriptor, OptionValue},
    resolver,
};

const CONFIG_ENV: &str = "GITEA_CLI_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "gitea.yml";
const DEFAULT_API_VERSION: &str = "v1";
const MASK: &str = "********";

// =============================================================================
// Domain
// =============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {section} config: {field} must not be empty")]
    Missing {
        section: &'static str,
        field: &'static str,
    },

    #[error("Invalid {section} config: base_url '{value}' is not a valid URL ({reason})")]
    InvalidUrl {
        section: &'static str,
        value: String,
        reason: url::ParseError,
    },
}

/// Location of a remote API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteInfo {
    pub api_ver: String,
    pub base_url: String,
}

impl Default for RemoteInfo {
    fn default() -> Self {
        Self {
            api_ver: DEFAULT_API_VERSION.to_string(),
            base_url: String::new(),
        }
    }
}

impl RemoteInfo {
    pub fn api_url(&self) -> String {
        api_url(&self.base_url, &self.api_ver)
    }

    fn validate(&self, section: &'static str) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Missing {
                section,
                field: "base_url",
            });
        }

        url::Url::parse(&self.base_url).map_err(|reason| ConfigError::InvalidUrl {
            section,
            value: self.base_url.clone(),
            reason,
        })?;

        if self.api_ver.is_empty() {
            return Err(ConfigError::Missing {
                section,
                field: "api_ver",
            });
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GiteaConfig {
    pub token_sha1: String,
    pub token_name: String,
    pub default_repo_name: String,
    pub default_repo_owner: String,
    pub default_base_for_pr: String,
    pub remote_info: RemoteInfo,
}

impl GiteaConfig {
    fn validate(&self, with_credentials: bool) -> Result<(), ConfigError> {
        if with_credentials {
            require("gitea", "token_sha1", &self.token_sha1)?;
            require("gitea", "token_name", &self.token_name)?;
        }

        self.remote_info.validate("gitea")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RocketchatConfig {
    pub enabled: bool,
    pub remote_info: RemoteInfo,
    pub user_id: String,
    pub token: String,
    pub default_notify_channel: String,
    /// Prepended to review requests unless `--nohdr` is passed.
    pub default_header: String,
}

impl RocketchatConfig {
    fn validate(&self, with_credentials: bool) -> Result<(), ConfigError> {
        if with_credentials {
            require("rocketchat", "user_id", &self.user_id)?;
            require("rocketchat", "token", &self.token)?;
        }

        self.remote_info.validate("rocketchat")
    }
}

/// Configuration structure stored in YAML format.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gitea: GiteaConfig,
    pub rocketchat: RocketchatConfig,
}

impl Config {
    /// Checks the server settings and, with `with_credentials`, the stored
    /// tokens. Rocketchat is only checked when it is enabled.
    pub fn validate(&self, with_credentials: bool) -> Result<(), ConfigError> {
        self.gitea.validate(with_credentials)?;

        if self.rocketchat.enabled {
            self.rocketchat.validate(with_credentials)?;
        }

        Ok(())
    }

    /// Loads the configuration at `path`. A missing file is not an error.
    pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
        // confy creates missing files, so check first.
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file");
            return Ok(None);
        }

        let config = confy::load_path(path)
            .with_context(|| format!("Failed to load configuration from '{}'", path.display()))?;

        Ok(Some(config))
    }

    /// Writes the configuration to `path`, readable by the owner only.
    pub fn store(&self, path: &Path) -> anyhow::Result<()> {
        confy::store_path(path, self)
            .with_context(|| format!("Failed to save configuration to '{}'", path.display()))?;

        restrict_permissions(path)
    }
}

/// The configuration file location: `$GITEA_CLI_CONFIG` or `./gitea.yml`.
pub fn config_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

// =============================================================================
// Command Options
// =============================================================================

pub fn config_new_options() -> Vec<OptionDescriptor> {
    vec![
        OptionDescriptor::text(&["url"], "Gitea server url (https://gitea.example.com)"),
        OptionDescriptor::with_default("Gitea api version", "", &["api"], DEFAULT_API_VERSION),
        OptionDescriptor::text(&["o", "owner"], "Default repo owner [empty if none]")
            .optional(true),
        OptionDescriptor::text(&["r", "repo"], "Default repo name [empty if none]").optional(true),
        OptionDescriptor::text(&["b", "base"], "Default base branch [empty if none]")
            .optional(true),
        OptionDescriptor::switch(&["rocketchat"], "Enable rocketchat notifications").ask(),
        OptionDescriptor::text(&["rocketurl"], "Rocketchat server url").no_prompt(),
        OptionDescriptor::text(&["channel"], "Default notification channel").no_prompt(),
        OptionDescriptor::text(&["header"], "Default message header").no_prompt(),
        OptionDescriptor::switch(&["force"], "overwrite an existing config file"),
    ]
}

pub fn config_rm_options() -> Vec<OptionDescriptor> {
    vec![OptionDescriptor::text(&["u", "user"], "Gitea username").no_prompt()]
}

// =============================================================================
// Command Logic
// =============================================================================

/// Execute the `config new` command.
pub fn config_new(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let [
        url,
        api,
        owner,
        repo,
        base,
        rocketchat,
        rocket_url,
        channel,
        header,
        force,
    ] = values
    else {
        anyhow::bail!("config new: unexpected number of option values");
    };

    if session.config_path.exists() && !force.present {
        anyhow::bail!(
            "Config file '{}' already exists. Use --force to overwrite it.",
            session.config_path.display()
        );
    }

    let mut config = Config {
        gitea: GiteaConfig {
            default_repo_name: repo.value.clone(),
            default_repo_owner: owner.value.clone(),
            default_base_for_pr: base.value.clone(),
            remote_info: RemoteInfo {
                api_ver: api.value.clone(),
                base_url: url.value.clone(),
            },
            ..Default::default()
        },
        ..Default::default()
    };

    if rocketchat.present {
        let mut rocket_options = vec![
            OptionDescriptor::text(&[], "Rocketchat server url (https://chat.example.com)"),
            OptionDescriptor::text(&[], "Default notification channel [empty if none]")
                .optional(true),
            OptionDescriptor::text(&[], "Default message header [empty if none]").optional(true),
        ];

        // Values given as flags are not asked for again.
        for (descriptor, value) in rocket_options.iter_mut().zip([rocket_url, channel, header]) {
            if !value.value.is_empty() {
                descriptor.skip_prompt = true;
            }
        }

        let prompted = resolver::resolve(&[], &rocket_options, session.terminal)?;
        let pick = |flag: &OptionValue, prompt: &OptionValue| {
            if flag.value.is_empty() {
                prompt.value.clone()
            } else {
                flag.value.clone()
            }
        };

        config.rocketchat = RocketchatConfig {
            enabled: true,
            remote_info: RemoteInfo {
                api_ver: DEFAULT_API_VERSION.to_string(),
                base_url: pick(rocket_url, &prompted[0]),
            },
            default_notify_channel: pick(channel, &prompted[1]),
            default_header: pick(header, &prompted[2]),
            ..Default::default()
        };
    }

    config
        .validate(false)
        .context("The entered settings are invalid")?;
    config.store(&session.config_path)?;

    println!(
        "Configuration saved to '{}'. Run `{} new cred` to create credentials.",
        session.config_path.display(),
        session.program
    );

    Ok(())
}

/// Execute the `config rm` command. A stored Gitea token is deleted on the
/// server first.
pub fn config_rm(session: &mut Session, _values: &[OptionValue]) -> anyhow::Result<()> {
    let config = session.config(false)?.clone();

    if config.gitea.token_name.is_empty() {
        debug!("no token to delete");
    } else {
        let credentials = resolver::resolve(
            &session.args,
            &[
                OptionDescriptor::text(&["u", "user"], "Gitea username"),
                OptionDescriptor::secret("Gitea password"),
            ],
            session.terminal,
        )?;

        gitea::delete_token(
            &HttpClient::new(),
            &config.gitea.remote_info.api_url(),
            &credentials[0].value,
            &credentials[1].value,
            &config.gitea.token_name,
        )
        .with_context(|| format!("Failed to delete token '{}'", config.gitea.token_name))?;

        println!("Deleted token '{}'", config.gitea.token_name);
    }

    fs::remove_file(&session.config_path).with_context(|| {
        format!(
            "Failed to remove configuration file '{}'",
            session.config_path.display()
        )
    })?;

    println!("Removed '{}'", session.config_path.display());

    Ok(())
}

/// Execute the `config show` command.
pub fn config_show(session: &mut Session, _values: &[OptionValue]) -> anyhow::Result<()> {
    let config = session.config(false)?;

    for (key, value) in flatten_config(config)? {
        println!("{key} = {value}");
    }

    Ok(())
}

/// Execute the `config edit` command.
pub fn config_edit(session: &mut Session, _values: &[OptionValue]) -> anyhow::Result<()> {
    session.config(false)?;

    let path = &session.config_path;
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file '{}'", path.display()))?;
    let edited_content = Editor::new()
        .extension(".yml")
        .edit(&content)
        .context("Failed to open editor")?;

    let Some(content) = edited_content else {
        eprintln!("Warning: Editor closed without saving. Nothing changed.");
        return Ok(());
    };

    fs::write(path, content.as_bytes()).context("Failed to write configuration file")?;
    restrict_permissions(path)?;

    Config::load(path)
        .context("The config file may be corrupted. Please check the YAML file.")?
        .context("The config file disappeared while editing")?
        .validate(false)
        .context("The config file was saved but is invalid")?;

    println!("Configuration saved successfully.");

    Ok(())
}

// =============================================================================
// Private Helpers
// =============================================================================

fn require(section: &'static str, field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Missing { section, field });
    }

    Ok(())
}

/// Flattens the configuration into sorted `section.key` pairs with secrets
/// masked.
fn flatten_config(config: &Config) -> anyhow::Result<Vec<(String, String)>> {
    let mut entries = Vec::new();

    collect_entries(&serde_json::to_value(config)?, "", &mut entries);
    entries.sort();

    Ok(entries)
}

fn collect_entries(value: &Value, prefix: &str, entries: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };

                collect_entries(value, &path, entries);
            }
        }
        Value::String(s) if is_secret_key(prefix) && !s.is_empty() => {
            entries.push((prefix.to_string(), MASK.to_string()));
        }
        Value::String(s) => entries.push((prefix.to_string(), s.clone())),
        other => entries.push((prefix.to_string(), other.to_string())),
    }
}

fn is_secret_key(path: &str) -> bool {
    matches!(path.rsplit('.').next(), Some("token_sha1" | "token"))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions of '{}'", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
