//! The `completions` command.

use std::{io, path::Path};

use clap::{Arg, ArgAction, Command, ValueEnum};
use clap_complete::{Shell, generate};

use crate::cli::{
    Session,
    option::{OptionDescriptor, OptionValue},
    tree::Branch,
};

// =============================================================================
// Command Options
// =============================================================================

pub fn completions_options() -> Vec<OptionDescriptor> {
    vec![OptionDescriptor::text(
        &["shell"],
        "Shell to generate completions for (bash, elvish, fish, powershell, zsh)",
    )]
}

// =============================================================================
// Command Logic
// =============================================================================

/// Execute the `completions` command.
pub fn generate_completions(session: &mut Session, values: &[OptionValue]) -> anyhow::Result<()> {
    let [shell] = values else {
        anyhow::bail!("completions: unexpected number of option values");
    };
    let shell = Shell::from_str(shell.as_str(), true)
        .map_err(|_| anyhow::anyhow!("Unsupported shell '{}'", shell.value))?;
    let program = Path::new(&session.program)
        .file_name()
        .map_or_else(|| session.program.clone(), |name| name.to_string_lossy().into_owned());
    let mut cmd = build_clap_command(&program, session.tree);
    let bin_name = cmd.get_name().to_string();

    generate(shell, &mut cmd, bin_name, &mut io::stdout());

    Ok(())
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Mirrors the command tree as nested clap subcommands. Commands registered
/// in any order show up under every ordering of their path.
fn build_clap_command(program: &str, tree: &Branch) -> Command {
    let root = Command::new(program.to_string())
        .disable_help_flag(true)
        .disable_help_subcommand(true);

    build_subcommands(root, tree)
}

fn build_subcommands(mut cmd: Command, branch: &Branch) -> Command {
    for child in &branch.branches {
        let mut sub = Command::new(child.label.clone())
            .disable_help_flag(true)
            .disable_help_subcommand(true);

        if let Some(command) = &child.command {
            sub = sub.about(command.description.clone());

            for option in command.options.iter().filter(|o| !o.flags.is_empty()) {
                sub = sub.arg(build_arg(option));
            }
        }

        cmd = cmd.subcommand(build_subcommands(sub, child));
    }

    cmd
}

fn build_arg(option: &OptionDescriptor) -> Arg {
    let mut arg = Arg::new(option.flags[0].clone())
        .help(option.label.clone())
        .required(false);

    for flag in &option.flags {
        let mut chars = flag.chars();

        arg = match (chars.next(), chars.next()) {
            (Some(short), None) if arg.get_short().is_none() => arg.short(short),
            (Some(short), None) => arg.visible_short_alias(short),
            _ if arg.get_long().is_none() => arg.long(flag.clone()),
            _ => arg.visible_alias(flag.clone()),
        };
    }

    if option.is_boolean {
        arg.action(ArgAction::SetTrue)
    } else {
        arg.action(ArgAction::Set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tree::Command as TreeCommand;

    fn noop(_: &mut Session, _: &[OptionValue]) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_build_clap_command_mirrors_tree() {
        let mut tree = Branch::default();

        tree.insert_fixed_order(
            TreeCommand::new(
                "Merge existing pull request",
                noop,
                vec![
                    OptionDescriptor::text(&["o", "owner"], "repo owner"),
                    OptionDescriptor::switch(&["rm", "del"], "Remove branch"),
                    OptionDescriptor::secret("password"),
                ],
            ),
            &["merge", "pr"],
        );

        let cmd = build_clap_command("gitea-cli", &tree);
        let merge = cmd.find_subcommand("merge").unwrap();
        let pr = merge.find_subcommand("pr").unwrap();

        assert_eq!(
            pr.get_about().map(|a| a.to_string()).as_deref(),
            Some("Merge existing pull request")
        );
        assert_eq!(pr.get_arguments().count(), 2);

        let owner = pr.get_arguments().find(|a| a.get_id() == "o").unwrap();

        assert_eq!(owner.get_short(), Some('o'));
        assert_eq!(owner.get_long(), Some("owner"));

        let remove = pr.get_arguments().find(|a| a.get_id() == "rm").unwrap();

        assert_eq!(remove.get_long(), Some("rm"));
        assert_eq!(remove.get_visible_aliases(), Some(vec!["del"]));
    }

    #[test]
    fn test_generate_bash_completions() {
        let mut tree = Branch::default();

        tree.insert_any_order(
            TreeCommand::new(
                "Create new pull request.",
                noop,
                vec![OptionDescriptor::text(&["h", "head"], "head branch")],
            ),
            &["new", "pr"],
        );

        let mut cmd = build_clap_command("gitea-cli", &tree);
        let mut buffer = Vec::new();

        generate(Shell::Bash, &mut cmd, "gitea-cli", &mut buffer);

        let script = String::from_utf8(buffer).unwrap();

        assert!(script.contains("--head"));
        assert!(script.contains("pr"));
    }
}
