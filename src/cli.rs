mod forge {
    pub mod gitea;
    mod http_client;
    pub mod rocketchat;

    pub use http_client::{HttpClient, api_url};
}

mod input {
    mod terminal;

    #[cfg(test)]
    pub(crate) use terminal::ScriptedTerminal;
    pub use terminal::{StdTerminal, Terminal, TerminalError, install_interrupt_handler};
}

mod args;
mod completions;
mod config;
mod cred;
mod option;
mod pr;
mod resolver;
mod tree;

pub use input::install_interrupt_handler;

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    rc::Rc,
};

use anyhow::Context;
use tracing::{debug, info};

use crate::cli::{
    config::Config,
    input::{StdTerminal, Terminal},
    option::OptionDescriptor,
    pr::WorkingCopy,
    tree::{Branch, Command, Requires},
};

// =============================================================================
// Session
// =============================================================================

/// Everything a command handler can reach while it runs.
pub struct Session<'a> {
    /// Name the program was invoked as.
    pub program: String,
    /// Raw arguments, without the program name.
    pub args: Vec<String>,
    /// `None` if there is no configuration file yet.
    pub config: Option<Config>,
    pub config_path: PathBuf,
    pub terminal: &'a mut dyn Terminal,
    pub tree: &'a Branch,
}

impl Session<'_> {
    /// The loaded configuration, validated. Fails with a hint on how to fix
    /// the configuration if it is missing or invalid.
    pub fn config(&self, with_credentials: bool) -> anyhow::Result<&Config> {
        let Some(config) = &self.config else {
            anyhow::bail!(
                "No configuration found at '{}'. Run `{} config new` to create one.",
                self.config_path.display(),
                self.program
            );
        };

        config.validate(with_credentials).with_context(|| {
            if with_credentials {
                format!(
                    "Configuration in '{}' is incomplete. Run `{} new cred` to create credentials.",
                    self.config_path.display(),
                    self.program
                )
            } else {
                format!(
                    "Configuration in '{}' is invalid. Run `{} config edit` to fix it.",
                    self.config_path.display(),
                    self.program
                )
            }
        })?;

        Ok(config)
    }

    pub fn store_config(&mut self, config: Config) -> anyhow::Result<()> {
        config.store(&self.config_path)?;
        self.config = Some(config);

        Ok(())
    }
}

// =============================================================================
// Command Registry
// =============================================================================

/// Registers every command. Option defaults are seeded from `config` and the
/// git working copy.
///
/// # Panics
///
/// Panics if two commands are registered under the same path.
pub fn build_command_tree(config: Option<&Config>, working_copy: &WorkingCopy) -> Branch {
    let mut root = Branch::default();

    root.insert_any_order(Command::new("Print this help.", help, Vec::new()), &["help"]);

    root.insert_fixed_order(
        Command::requiring(
            Requires::Config,
            "Create new gitea credentials.",
            cred::new_gitea_cred,
            cred::gitea_cred_options(),
        ),
        &["new", "g", "cred"],
    );
    root.insert_fixed_order(
        Command::requiring(
            Requires::Config,
            "Create new rocketchat credentials.",
            cred::new_rocketchat_cred,
            cred::rocketchat_cred_options(true),
        ),
        &["new", "r", "cred"],
    );
    root.insert_any_order(
        Command::requiring(
            Requires::Config,
            "Create new credentials.",
            cred::new_cred,
            cred::cred_options(config),
        ),
        &["new", "cred"],
    );
    root.insert_any_order(
        Command::requiring(
            Requires::Credentials,
            "Remove credentials.",
            cred::rm_cred,
            cred::rm_cred_options(),
        ),
        &["rm", "cred"],
    );

    root.insert_fixed_order(
        Command::requiring(
            Requires::Credentials,
            "Create new pull request.",
            pr::new_pr,
            pr::new_pr_options(config, working_copy),
        ),
        &["new", "pr"],
    );
    root.insert_fixed_order(
        Command::requiring(
            Requires::Credentials,
            "List open pull requests.",
            pr::list_prs,
            pr::list_pr_options(config, working_copy),
        ),
        &["list", "pr"],
    );
    root.insert_fixed_order(
        Command::requiring(
            Requires::Credentials,
            "Merge existing pull request.",
            pr::merge_pr,
            pr::merge_pr_options(config, working_copy),
        ),
        &["merge", "pr"],
    );
    root.insert_fixed_order(
        Command::requiring(
            Requires::Credentials,
            "Rename or close existing pull request.",
            pr::update_pr,
            pr::update_pr_options(config, working_copy),
        ),
        &["update", "pr"],
    );

    root.insert_any_order(
        Command::new(
            "Create a new config file.",
            config::config_new,
            config::config_new_options(),
        ),
        &["config", "new"],
    );
    root.insert_any_order(
        Command::requiring(
            Requires::Config,
            "Delete the gitea token and remove the config file.",
            config::config_rm,
            config::config_rm_options(),
        ),
        &["config", "rm"],
    );
    root.insert_any_order(
        Command::requiring(
            Requires::Config,
            "Print the config with secrets hidden.",
            config::config_show,
            Vec::new(),
        ),
        &["config", "show"],
    );
    root.insert_any_order(
        Command::requiring(
            Requires::Config,
            "Edit the config file in $EDITOR.",
            config::config_edit,
            Vec::new(),
        ),
        &["config", "edit"],
    );

    root.insert_any_order(
        Command::new(
            "Print a shell completion script.",
            completions::generate_completions,
            completions::completions_options(),
        ),
        &["completions"],
    );

    root
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Runs the command named by `argv`. `argv[0]` is the program name.
///
/// Prints the usage and returns a failure code if no command matches.
pub fn dispatch(argv: &[String]) -> anyhow::Result<ExitCode> {
    let config_path = config::config_path();
    let config = Config::load(&config_path)?;
    let tree = build_command_tree(config.as_ref(), &WorkingCopy::detect());
    let mut terminal = StdTerminal;
    let mut session = Session {
        program: argv.first().cloned().unwrap_or_else(|| "gitea-cli".to_string()),
        args: argv.get(1..).unwrap_or_default().to_vec(),
        config,
        config_path,
        terminal: &mut terminal,
        tree: &tree,
    };

    run_command(&mut session)
}

/// Looks up the command named by the session's arguments, checks its
/// configuration requirement, resolves its options and runs it.
fn run_command(session: &mut Session) -> anyhow::Result<ExitCode> {
    let tree = session.tree;
    let Some(command) = find_command(tree, &session.args) else {
        write_usage(&mut io::stderr().lock(), &session.program, tree)?;
        return Ok(ExitCode::FAILURE);
    };

    info!(command = %command.description, "dispatching");

    match command.requires {
        Requires::Nothing => {}
        Requires::Config => {
            session.config(false)?;
        }
        Requires::Credentials => {
            session.config(true)?;
        }
    }

    let values = resolver::resolve(&session.args, &command.options, session.terminal)
        .context("Failed to resolve command options")?;

    (command.handler)(session, &values)?;

    Ok(ExitCode::SUCCESS)
}

/// Finds the command named by `args`.
///
/// Whether an argument is a flag value depends on the command, so every
/// command reads the arguments with its own flags, and is taken only if that
/// reading leads back to it. Candidates are tried in registration order.
fn find_command<'t>(tree: &'t Branch, args: &[String]) -> Option<&'t Rc<Command>> {
    tree.commands().into_iter().find_map(|(_, candidate)| {
        let tokens = args::positionals(args, &args::flag_specs(&candidate.options));

        debug!(?tokens, command = %candidate.description, "trying command");

        tree.find_command(&tokens)
            .filter(|found| Rc::ptr_eq(found, candidate))
    })
}

fn help(session: &mut Session, _values: &[option::OptionValue]) -> anyhow::Result<()> {
    write_usage(&mut io::stdout().lock(), &session.program, session.tree)?;

    Ok(())
}

/// Prints every command path, grouped by command, followed by the flags of
/// the command.
fn write_usage(out: &mut impl Write, program: &str, tree: &Branch) -> io::Result<()> {
    const INDENT: &str = "  ";

    let mut groups: Vec<(&Rc<Command>, Vec<String>)> = Vec::new();

    for (path, command) in tree.commands() {
        let path = format!("{program} {}", path.join(" "));

        match groups
            .iter_mut()
            .find(|(c, _)| c.description == command.description)
        {
            Some((_, paths)) => paths.push(path),
            None => groups.push((command, vec![path])),
        }
    }

    writeln!(out, "Manage gitea repository\n")?;
    writeln!(
        out,
        "Usage:\n{INDENT}{program} [options] [command]\n{INDENT}{program} [command] [options]\n"
    )?;
    writeln!(out, "Commands:\n")?;

    for (command, paths) in groups {
        for (index, path) in paths.iter().enumerate() {
            if index == paths.len() - 1 {
                writeln!(out, "{path}{INDENT}\t{}", command.description)?;
            } else {
                writeln!(out, "{path}")?;
            }
        }

        let flagged = command
            .options
            .iter()
            .filter(|o| !o.flags.is_empty())
            .collect::<Vec<&OptionDescriptor>>();

        if !flagged.is_empty() {
            writeln!(out, "{INDENT}Arguments:")?;

            for option in flagged {
                writeln!(out, "\t{}\t{}", option.flag_summary(), option.label)?;
            }
        }

        writeln!(out)?;
    }

    Ok(())
}
