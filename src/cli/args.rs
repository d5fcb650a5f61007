//! Splits raw process arguments into flags and command words.
//!
//! Lexing is done by `clap_lex`, so `-o value`, `-ovalue`, `-o=value`,
//! clustered switches (`-wd`), `--owner value`, `--owner=value` and `--`
//! read the same way they do for clap-based tools. Which flags exist and
//! which of them take a value is only known at run time, from the option
//! descriptors of a command.

use std::ffi::OsStr;

use clap_lex::{ArgCursor, RawArgs};

use crate::cli::option::OptionDescriptor;

/// A flag the caller knows about.
#[derive(Clone, Copy, Debug)]
pub struct FlagSpec<'a> {
    pub name: &'a str,
    pub takes_value: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// A known flag; `value` is empty for switches.
    Flag { name: String, value: String },
    Positional(String),
    /// A flag nobody declared, or a switch given a value.
    Unknown(String),
    /// A value flag at the end of the arguments or followed by another flag.
    MissingValue(String),
}

/// The flags declared by `descriptors`.
pub fn flag_specs(descriptors: &[OptionDescriptor]) -> Vec<FlagSpec<'_>> {
    descriptors
        .iter()
        .flat_map(|descriptor| {
            descriptor.flags.iter().map(|flag| FlagSpec {
                name: flag,
                takes_value: !descriptor.is_boolean,
            })
        })
        .collect()
}

/// Splits `args` into tokens according to `specs`.
pub fn lex(args: &[String], specs: &[FlagSpec]) -> Vec<Token> {
    let raw = RawArgs::new(args);
    let mut cursor = raw.cursor();
    let mut tokens = Vec::new();

    while let Some(arg) = raw.next(&mut cursor) {
        if arg.is_escape() {
            tokens.extend(raw.remaining(&mut cursor).map(|rest| Token::Positional(lossy(rest))));
            break;
        }

        if let Some((name, inline_value)) = arg.to_long() {
            let name = name.map_or_else(lossy, str::to_string);

            tokens.push(match find_spec(specs, &name, true) {
                None => Token::Unknown(name),
                Some(spec) if !spec.takes_value => match inline_value {
                    Some(_) => Token::Unknown(name),
                    None => switch(name),
                },
                Some(_) => match inline_value.map(lossy).or_else(|| next_value(&raw, &mut cursor)) {
                    Some(value) => Token::Flag { name, value },
                    None => Token::MissingValue(name),
                },
            });

            continue;
        }

        let Some(mut shorts) = arg.to_short() else {
            tokens.push(Token::Positional(lossy(arg.to_value_os())));
            continue;
        };

        // The first value flag of a cluster takes the rest of the cluster or
        // the next argument.
        while let Some(short) = shorts.next_flag() {
            let name = match short {
                Ok(short) => short.to_string(),
                Err(rest) => {
                    tokens.push(Token::Unknown(lossy(rest)));
                    break;
                }
            };

            match find_spec(specs, &name, false) {
                None => tokens.push(Token::Unknown(name)),
                Some(spec) if !spec.takes_value => tokens.push(switch(name)),
                Some(_) => {
                    let value = match shorts.next_value_os() {
                        Some(attached) => {
                            let attached = lossy(attached);

                            Some(attached.strip_prefix('=').map_or(attached.clone(), str::to_string))
                        }
                        None => next_value(&raw, &mut cursor),
                    };

                    tokens.push(match value {
                        Some(value) => Token::Flag { name, value },
                        None => Token::MissingValue(name),
                    });

                    break;
                }
            }
        }
    }

    tokens
}

/// Returns the positional arguments of `args`, dropping flags and the values
/// they consume.
pub fn positionals(args: &[String], specs: &[FlagSpec]) -> Vec<String> {
    lex(args, specs)
        .into_iter()
        .filter_map(|token| match token {
            Token::Positional(value) => Some(value),
            _ => None,
        })
        .collect()
}

/// Takes the next argument as a flag value unless it is a flag itself.
fn next_value(raw: &RawArgs, cursor: &mut ArgCursor) -> Option<String> {
    let next = raw.peek(cursor)?;

    if next.is_long() || next.is_short() || next.is_escape() {
        return None;
    }

    raw.next_os(cursor).map(lossy)
}

fn find_spec<'a>(specs: &'a [FlagSpec<'a>], name: &str, long: bool) -> Option<&'a FlagSpec<'a>> {
    specs
        .iter()
        .find(|spec| spec.name == name && (spec.name.chars().count() > 1) == long)
}

fn switch(name: String) -> Token {
    Token::Flag {
        name,
        value: String::new(),
    }
}

fn lossy(value: &OsStr) -> String {
    value.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[FlagSpec] = &[
        FlagSpec {
            name: "o",
            takes_value: true,
        },
        FlagSpec {
            name: "owner",
            takes_value: true,
        },
        FlagSpec {
            name: "w",
            takes_value: false,
        },
        FlagSpec {
            name: "d",
            takes_value: false,
        },
        FlagSpec {
            name: "rm",
            takes_value: false,
        },
    ];

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn flag(name: &str, value: &str) -> Token {
        Token::Flag {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_lex_short_and_long_values() {
        let tokens = lex(
            &args(&["-o", "acme", "--owner", "x", "--owner=y", "-oz", "-o=q"]),
            SPECS,
        );

        assert_eq!(
            tokens,
            vec![
                flag("o", "acme"),
                flag("owner", "x"),
                flag("owner", "y"),
                flag("o", "z"),
                flag("o", "q"),
            ]
        );
    }

    #[test]
    fn test_lex_clustered_switches() {
        let tokens = lex(&args(&["-wd", "--rm"]), SPECS);

        assert_eq!(tokens, vec![flag("w", ""), flag("d", ""), flag("rm", "")]);
    }

    #[test]
    fn test_lex_cluster_ending_in_value_flag() {
        let tokens = lex(&args(&["-wo", "acme"]), SPECS);

        assert_eq!(tokens, vec![flag("w", ""), flag("o", "acme")]);
    }

    #[test]
    fn test_lex_unknown_and_missing() {
        let tokens = lex(&args(&["-x", "--nope", "-o", "-w", "--owner"]), SPECS);

        assert_eq!(
            tokens,
            vec![
                Token::Unknown("x".to_string()),
                Token::Unknown("nope".to_string()),
                Token::MissingValue("o".to_string()),
                flag("w", ""),
                Token::MissingValue("owner".to_string()),
            ]
        );
    }

    #[test]
    fn test_lex_switch_with_inline_value_is_unknown() {
        let tokens = lex(&args(&["--rm=yes"]), SPECS);

        assert_eq!(tokens, vec![Token::Unknown("rm".to_string())]);
    }

    #[test]
    fn test_long_spelling_is_not_a_short_flag() {
        // "rm" is only reachable as --rm, so -rm is two unknown short flags.
        let tokens = lex(&args(&["-rm"]), SPECS);

        assert_eq!(
            tokens,
            vec![
                Token::Unknown("r".to_string()),
                Token::Unknown("m".to_string())
            ]
        );
    }

    #[test]
    fn test_positionals_drop_flags_and_values() {
        let result = positionals(
            &args(&["new", "-o", "acme", "pr", "-w", "-", "--", "-d"]),
            SPECS,
        );

        assert_eq!(result, vec!["new", "pr", "-", "-d"]);
    }

    #[test]
    fn test_flag_specs_follow_descriptors() {
        let descriptors = vec![
            OptionDescriptor::text(&["o", "owner"], "repo owner"),
            OptionDescriptor::switch(&["f", "force"], "Force merge"),
            OptionDescriptor::secret("password"),
        ];
        let specs = flag_specs(&descriptors);
        let summary = specs
            .iter()
            .map(|spec| (spec.name, spec.takes_value))
            .collect::<Vec<_>>();

        assert_eq!(
            summary,
            vec![("o", true), ("owner", true), ("f", false), ("force", false)]
        );
    }
}
