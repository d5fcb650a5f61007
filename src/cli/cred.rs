//! The credential commands: create and remove the tokens stored in the
//! configuration file.

use anyhow::Context;
use rand::Rng;

use crate::cli::{
    Session,
    config::Config,
    forge::{HttpClient, gitea, rocketchat},
    option::{OptionDefault, OptionDescriptor, OptionValue},
};

const TOKEN_NAME_LENGTH: usize = 8;
const TOKEN_NAME_CHARSET: &[u8] = b"qwertyuiopasdfghjklzxcvbnm";

// =============================================================================
// Command Options
// =============================================================================

pub fn gitea_cred_options() -> Vec<OptionDescriptor> {
    vec![
        OptionDescriptor::text(&["u", "user"], "Gitea username"),
        OptionDescriptor::secret("Gitea password"),
        OptionDescriptor::text(&["t", "token"], "Token name (default: random)")
            .optional(true)
            .default_value(OptionDefault::Deferred(Box::new(
                || -> anyhow::Result<String> { Ok(random_token_name()) },
            ))),
    ]
}

/// Rocketchat login options. They are neither prompted for nor required
/// unless `with_rocketchat` is set.
pub fn rocketchat_cred_options(with_rocketchat: bool) -> Vec<OptionDescriptor> {
    let options = vec![
        OptionDescriptor::text(&["rocketuser"], "Rocketchat username"),
        OptionDescriptor::secret("Rocketchat password"),
    ];

    if with_rocketchat {
        return options;
    }

    options
        .into_iter()
        .map(|option| option.no_prompt().optional(true))
        .collect()
}

pub fn cred_options(config: Option<&Config>) -> Vec<OptionDescriptor> {
    let with_rocketchat = config.is_some_and(|c| c.rocketchat.enabled);
    let mut options = gitea_cred_options();

    options.extend(rocketchat_cred_options(with_rocketchat));

    options
}

pub fn rm_cred_options() -> Vec<OptionDescriptor> {
    vec![
        OptionDescriptor::text(&["u", "user"], "Gitea username"),
        OptionDescriptor::secret("Gitea password"),
    ]
}

// =============================================================================
// Command Logic
// =============================================================================

/// Execute the `new g cred` command.
pub fn new_gitea_cred(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let mut config = session.config(false)?.clone();

    set_gitea_cred(&mut config, values)?;
    session.store_config(config)
}

/// Execute the `new r cred` command.
pub fn new_rocketchat_cred(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let mut config = session.config(false)?.clone();

    require_rocketchat(&config, &session.program)?;
    set_rocketchat_cred(&mut config, values)?;
    session.store_config(config)
}

/// Execute the `new cred` command.
pub fn new_cred(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let mut config = session.config(false)?.clone();
    let (gitea_values, rocketchat_values) = values.split_at(values.len().min(3));

    set_gitea_cred(&mut config, gitea_values)?;

    if config.rocketchat.enabled {
        set_rocketchat_cred(&mut config, rocketchat_values)?;
    }

    session.store_config(config)
}

/// Execute the `rm cred` command.
pub fn rm_cred(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let [user, password] = values else {
        anyhow::bail!("rm cred: unexpected number of option values");
    };
    let mut config = session.config(true)?.clone();

    gitea::delete_token(
        &HttpClient::new(),
        &config.gitea.remote_info.api_url(),
        &user.value,
        &password.value,
        &config.gitea.token_name,
    )
    .with_context(|| format!("Failed to delete token '{}'", config.gitea.token_name))?;

    println!("Deleted token '{}'", config.gitea.token_name);

    config.gitea.token_name.clear();
    config.gitea.token_sha1.clear();

    session.store_config(config)
}

// =============================================================================
// Private Helpers
// =============================================================================

fn set_gitea_cred(config: &mut Config, values: &[OptionValue]) -> anyhow::Result<()> {
    let [user, password, token_name] = values else {
        anyhow::bail!("gitea credentials: unexpected number of option values");
    };

    let token = gitea::create_token(
        &HttpClient::new(),
        &config.gitea.remote_info.api_url(),
        &user.value,
        &password.value,
        &token_name.value,
    )
    .context("Failed to create Gitea token")?;

    println!("Created gitea token with name: {}", token.name);

    config.gitea.token_name = token.name;
    config.gitea.token_sha1 = token.sha1;

    Ok(())
}

fn set_rocketchat_cred(config: &mut Config, values: &[OptionValue]) -> anyhow::Result<()> {
    let [user, password] = values else {
        anyhow::bail!("rocketchat credentials: unexpected number of option values");
    };

    let session = rocketchat::login(
        &HttpClient::new(),
        &config.rocketchat.remote_info.api_url(),
        &user.value,
        &password.value,
    )
    .context("Failed to log in to Rocketchat")?;

    println!("Logged in to Rocketchat as {}", user.value);

    config.rocketchat.token = session.auth_token;
    config.rocketchat.user_id = session.user_id;

    Ok(())
}

fn require_rocketchat(config: &Config, program: &str) -> anyhow::Result<()> {
    if !config.rocketchat.enabled {
        anyhow::bail!(
            "Rocketchat is not enabled. Set rocketchat.enabled and rocketchat.remote_info.base_url with `{program} config edit` first."
        );
    }

    Ok(())
}

fn random_token_name() -> String {
    let mut rng = rand::rng();

    (0..TOKEN_NAME_LENGTH)
        .map(|_| TOKEN_NAME_CHARSET[rng.random_range(0..TOKEN_NAME_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cli::{input::ScriptedTerminal, tree::Branch};

    #[test]
    fn test_new_rocketchat_cred_refuses_when_disabled() {
        let tree = Branch::default();
        let mut terminal = ScriptedTerminal::new(&[]);
        let mut config = Config::default();
        config.gitea.remote_info.base_url = "https://gitea.example.com".to_string();

        let mut session = Session {
            program: "gitea-cli".to_string(),
            args: Vec::new(),
            config: Some(config),
            config_path: PathBuf::from("gitea.yml"),
            terminal: &mut terminal,
            tree: &tree,
        };
        let values = vec![OptionValue::default(), OptionValue::default()];

        let error = new_rocketchat_cred(&mut session, &values).unwrap_err();

        assert!(error.to_string().contains("Rocketchat is not enabled"));
    }

    #[test]
    fn test_random_token_name() {
        let name = random_token_name();

        assert_eq!(name.len(), TOKEN_NAME_LENGTH);
        assert!(name.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_token_name_defaults_to_random() {
        let options = gitea_cred_options();
        let default = options[2].default.as_ref().unwrap().evaluate().unwrap();

        assert_eq!(default.len(), TOKEN_NAME_LENGTH);
        assert!(options[2].optional);
    }

    #[test]
    fn test_rocketchat_options_are_silent_when_disabled() {
        let options = cred_options(None);

        assert_eq!(options.len(), 5);
        assert!(options[3..].iter().all(|o| o.skip_prompt && o.optional));
    }

    #[test]
    fn test_rocketchat_options_are_required_when_enabled() {
        let mut config = Config::default();
        config.rocketchat.enabled = true;

        let options = cred_options(Some(&config));

        assert!(options[3..].iter().all(|o| !o.skip_prompt && !o.optional));
        assert!(options[4].is_secret);
    }
}
