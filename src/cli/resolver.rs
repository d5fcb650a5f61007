//! Turns option descriptors plus raw arguments into concrete values.
//!
//! Sources are merged in this order: command-line flags, interactive
//! prompts, then the descriptor's default.

use std::{collections::HashMap, io};

use thiserror::Error;
use tracing::{debug, trace};

use crate::cli::{
    args::{self, Token},
    input::{Terminal, TerminalError},
    option::{OptionDescriptor, OptionValue},
};

const APP_NAME: &str = std::env!("CARGO_PKG_NAME");

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error("Failed to talk to the terminal")]
    Io(#[from] io::Error),

    #[error("Input ended before a value for '{0}' was entered")]
    EndOfInput(String),

    #[error("Failed to compute the default value for '{label}'")]
    Default {
        label: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Resolves `descriptors` against `args`, prompting on `terminal` where
/// needed. The returned values are paired by index with `descriptors`.
///
/// Unknown flags are reported on stderr and otherwise ignored.
pub fn resolve(
    args: &[String],
    descriptors: &[OptionDescriptor],
    terminal: &mut dyn Terminal,
) -> Result<Vec<OptionValue>, ResolveError> {
    let mut values = apply_flags(args, descriptors);

    for (descriptor, value) in descriptors.iter().zip(values.iter_mut()) {
        if !value.value.is_empty() || (descriptor.is_boolean && value.present) {
            trace!(label = %descriptor.label, "value provided by flag");
            continue;
        }

        if !descriptor.skip_prompt {
            if descriptor.is_boolean {
                value.present = confirm(&descriptor.label, terminal)?;
                continue;
            }

            value.value = prompt_for_text(descriptor, terminal)?;
        }

        if value.value.is_empty() && !descriptor.is_boolean {
            if let Some(default) = &descriptor.default {
                value.value = default.evaluate().map_err(|source| ResolveError::Default {
                    label: descriptor.label.clone(),
                    source,
                })?;

                trace!(label = %descriptor.label, "value taken from default");
            }
        }
    }

    Ok(values)
}

/// Asks a yes/no question. Only an exact `y` counts as yes.
pub fn confirm(label: &str, terminal: &mut dyn Terminal) -> Result<bool, ResolveError> {
    terminal.print(&format!("{label} [y/n]: "))?;

    let answer = terminal.read_line()?.unwrap_or_default();

    Ok(strip_newline(&answer) == "y")
}

/// Parses all flags of all descriptors in a single pass.
fn apply_flags(args: &[String], descriptors: &[OptionDescriptor]) -> Vec<OptionValue> {
    let mut values = vec![OptionValue::default(); descriptors.len()];
    let owners = descriptors
        .iter()
        .enumerate()
        .flat_map(|(index, descriptor)| descriptor.flags.iter().map(move |flag| (flag.as_str(), index)))
        .collect::<HashMap<&str, usize>>();

    for token in args::lex(args, &args::flag_specs(descriptors)) {
        match token {
            Token::Flag { name, value } => {
                let Some(&index) = owners.get(name.as_str()) else {
                    continue;
                };

                debug!(flag = %name, "flag matched");

                values[index].value = value;

                if descriptors[index].is_boolean {
                    values[index].present = true;
                }
            }
            Token::Unknown(name) => eprintln!("{APP_NAME}: invalid option -- '{name}'"),
            Token::MissingValue(name) => {
                eprintln!("{APP_NAME}: option requires an argument -- '{name}'")
            }
            Token::Positional(_) => {}
        }
    }

    values
}

fn prompt_for_text(
    descriptor: &OptionDescriptor,
    terminal: &mut dyn Terminal,
) -> Result<String, ResolveError> {
    loop {
        terminal.print(&format!("{}: ", descriptor.label))?;

        let line = if descriptor.is_secret {
            terminal.read_secret()?
        } else {
            terminal.read_line()?
        };

        let Some(line) = line else {
            if descriptor.optional {
                return Ok(String::new());
            }

            return Err(ResolveError::EndOfInput(descriptor.label.clone()));
        };
        let line = strip_newline(&line);

        if !line.is_empty() || descriptor.optional {
            return Ok(line.to_string());
        }
    }
}

fn strip_newline(line: &str) -> &str {
    line.strip_suffix('\n').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{input::ScriptedTerminal, option::OptionDefault};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn deferred(value: &'static str) -> OptionDefault {
        OptionDefault::Deferred(Box::new(move || -> anyhow::Result<String> {
            Ok(value.to_string())
        }))
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn test_default_used_without_prompting() {
        let descriptors = vec![
            OptionDescriptor::text(&["n", "name"], "name")
                .no_prompt()
                .default_value(deferred("abc")),
        ];
        let mut terminal = ScriptedTerminal::new(&[]);

        let values = resolve(&[], &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "abc");
        assert!(!values[0].present);
        assert_eq!(terminal.reads, 0);
    }

    #[test]
    fn test_with_default_helper_skips_prompt() {
        let descriptors = vec![OptionDescriptor::with_default(
            "repo owner",
            "",
            &["o", "owner"],
            "acme",
        )];
        let mut terminal = ScriptedTerminal::new(&[]);

        let values = resolve(&[], &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "acme");
        assert!(terminal.output.is_empty());
    }

    #[test]
    fn test_empty_optional_answer_falls_back_to_default() {
        let descriptors = vec![
            OptionDescriptor::text(&["a", "api"], "api version")
                .optional(true)
                .default_value(OptionDefault::Constant("v1".to_string())),
        ];
        let mut terminal = ScriptedTerminal::new(&[""]);

        let values = resolve(&[], &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "v1");
        assert_eq!(terminal.reads, 1);
    }

    #[test]
    fn test_failing_default_aborts_resolution() {
        let descriptors = vec![
            OptionDescriptor::text(&["h"], "head")
                .no_prompt()
                .default_value(OptionDefault::Deferred(Box::new(|| -> anyhow::Result<String> {
                    anyhow::bail!("not a git repository")
                }))),
        ];
        let mut terminal = ScriptedTerminal::new(&[]);

        let result = resolve(&[], &descriptors, &mut terminal);

        assert!(matches!(result, Err(ResolveError::Default { .. })));
    }

    #[test]
    fn test_default_not_evaluated_when_flag_given() {
        let descriptors = vec![
            OptionDescriptor::text(&["h"], "head")
                .no_prompt()
                .default_value(OptionDefault::Deferred(Box::new(|| -> anyhow::Result<String> {
                    panic!("default must not be evaluated")
                }))),
        ];
        let mut terminal = ScriptedTerminal::new(&[]);

        let values = resolve(&args(&["-h", "feature"]), &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "feature");
    }

    // =========================================================================
    // Prompts
    // =========================================================================

    #[test]
    fn test_required_value_prompts_until_non_empty() {
        let descriptors = vec![OptionDescriptor::text(&["name"], "name")];
        let mut terminal = ScriptedTerminal::new(&["", "", "bob"]);

        let values = resolve(&[], &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "bob");
        assert_eq!(terminal.reads, 3);
        assert_eq!(terminal.output, "name: name: name: ");
    }

    #[test]
    fn test_flag_skips_prompt() {
        let descriptors = vec![
            OptionDescriptor::text(&["n", "name"], "name")
                .default_value(OptionDefault::Constant("abc".to_string())),
        ];
        let mut terminal = ScriptedTerminal::new(&["ignored"]);

        let values = resolve(&args(&["--name", "foo"]), &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "foo");
        assert_eq!(terminal.reads, 0);
    }

    #[test]
    fn test_only_one_trailing_newline_is_removed() {
        let descriptors = vec![OptionDescriptor::text(&[], "title")];
        let mut terminal = ScriptedTerminal::new(&["  spaced title \n"]);

        let values = resolve(&[], &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "  spaced title \n");
    }

    #[test]
    fn test_end_of_input_on_required_value_is_an_error() {
        let descriptors = vec![OptionDescriptor::text(&[], "title")];
        let mut terminal = ScriptedTerminal::new(&[""]);

        let result = resolve(&[], &descriptors, &mut terminal);

        assert!(matches!(result, Err(ResolveError::EndOfInput(label)) if label == "title"));
    }

    #[test]
    fn test_boolean_prompt_answers() {
        for (answer, expected) in [("y", true), ("n", false), ("", false), ("yes", false)] {
            let descriptors = vec![OptionDescriptor::switch(&["w"], "work in progress").ask()];
            let mut terminal = ScriptedTerminal::new(&[answer]);

            let values = resolve(&[], &descriptors, &mut terminal).unwrap();

            assert_eq!(values[0].present, expected, "answer: {answer:?}");
            assert_eq!(terminal.reads, 1, "booleans never loop");
            assert_eq!(terminal.output, "work in progress [y/n]: ");
        }
    }

    #[test]
    fn test_switch_without_prompt_stays_false() {
        let descriptors = vec![OptionDescriptor::switch(&["d", "dry"], "dry run")];
        let mut terminal = ScriptedTerminal::new(&[]);

        let values = resolve(&[], &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0], OptionValue::default());
    }

    // =========================================================================
    // Secrets
    // =========================================================================

    #[test]
    fn test_secret_prompt_reads_hidden_input() {
        let descriptors = vec![OptionDescriptor::secret("Gitea password")];
        let mut terminal = ScriptedTerminal::new(&["hunter2"]);

        let values = resolve(&[], &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "hunter2");
        assert_eq!(terminal.secret_reads, 1);
        assert_eq!(terminal.reads, 0);
        assert_eq!(terminal.output, "Gitea password: ");
    }

    #[test]
    fn test_secret_prompt_fails_when_terminal_fails() {
        let descriptors = vec![
            OptionDescriptor::secret("Gitea password"),
            OptionDescriptor::text(&[], "token name"),
        ];
        let mut terminal = ScriptedTerminal::new(&["hunter2", "laptop"]);
        terminal.fail_secret = true;

        let result = resolve(&[], &descriptors, &mut terminal);

        assert!(matches!(result, Err(ResolveError::Terminal(_))));
        assert_eq!(terminal.secret_reads, 1);
        assert_eq!(terminal.reads, 0);
    }

    #[test]
    fn test_empty_secret_prompts_again() {
        let descriptors = vec![OptionDescriptor::secret("Gitea password")];
        let mut terminal = ScriptedTerminal::new(&["", "hunter2"]);

        let values = resolve(&[], &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "hunter2");
        assert_eq!(terminal.secret_reads, 2);
    }

    // =========================================================================
    // Flags
    // =========================================================================

    #[test]
    fn test_unknown_flag_does_not_abort() {
        let descriptors = vec![OptionDescriptor::text(&["o", "owner"], "repo owner")];
        let mut terminal = ScriptedTerminal::new(&[]);

        let values = resolve(&args(&["-x", "-o", "acme"]), &descriptors, &mut terminal).unwrap();

        assert_eq!(values[0].value, "acme");
    }

    #[test]
    fn test_positional_command_tokens_are_ignored() {
        let descriptors = vec![OptionDescriptor::switch(&["w", "wip"], "work in progress")];
        let mut terminal = ScriptedTerminal::new(&[]);

        let values = resolve(&args(&["new", "pr", "--wip"]), &descriptors, &mut terminal).unwrap();

        assert!(values[0].present);
        assert!(values[0].value.is_empty());
    }

    #[test]
    fn test_end_to_end_flags_and_defaults() {
        let descriptors = vec![
            OptionDescriptor::text(&["o", "owner"], "repo owner"),
            OptionDescriptor::text(&["r", "repo"], "repo name"),
            OptionDescriptor::switch(&["w", "wip"], "work in progress"),
            OptionDescriptor::text(&[], "title")
                .no_prompt()
                .default_value(deferred("acme")),
        ];
        let mut terminal = ScriptedTerminal::new(&[]);

        let values = resolve(
            &args(&["-o", "acme", "-r", "repo1", "-w"]),
            &descriptors,
            &mut terminal,
        )
        .unwrap();

        assert_eq!(values[0].value, "acme");
        assert_eq!(values[1].value, "repo1");
        assert!(values[2].present);
        assert_eq!(values[3].value, "acme");
        assert_eq!(terminal.reads, 0);
    }
}
