//! Declarative descriptions of the values a command needs.

use std::fmt;

/// Fallback for an option that received no value from a flag or a prompt.
pub enum OptionDefault {
    /// A value known when the command tree is built.
    Constant(String),
    /// A value computed lazily, at most once per resolution. A failure aborts
    /// the resolution of the whole command.
    Deferred(Box<dyn Fn() -> anyhow::Result<String>>),
}

impl OptionDefault {
    pub fn evaluate(&self) -> anyhow::Result<String> {
        match self {
            OptionDefault::Constant(value) => Ok(value.clone()),
            OptionDefault::Deferred(provider) => provider(),
        }
    }
}

impl fmt::Debug for OptionDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionDefault::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            OptionDefault::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// One value a command expects after resolution.
///
/// Flag spellings with a single character are short flags (`-o`), longer
/// spellings are long flags (`--owner`).
#[derive(Debug)]
pub struct OptionDescriptor {
    pub flags: Vec<String>,
    pub label: String,
    pub is_boolean: bool,
    pub is_secret: bool,
    pub skip_prompt: bool,
    pub optional: bool,
    pub default: Option<OptionDefault>,
}

impl OptionDescriptor {
    /// A required string value that is prompted for when no flag provides it.
    pub fn text(flags: &[&str], label: &str) -> Self {
        Self {
            flags: flags.iter().map(|f| f.to_string()).collect(),
            label: label.to_string(),
            is_boolean: false,
            is_secret: false,
            skip_prompt: false,
            optional: false,
            default: None,
        }
    }

    /// A required value read without terminal echo. Secrets can't be passed
    /// as flags.
    pub fn secret(label: &str) -> Self {
        Self {
            is_secret: true,
            ..Self::text(&[], label)
        }
    }

    /// A presence switch. Switches are never prompted for unless
    /// [`OptionDescriptor::ask`] is used.
    pub fn switch(flags: &[&str], label: &str) -> Self {
        Self {
            is_boolean: true,
            skip_prompt: true,
            optional: true,
            ..Self::text(flags, label)
        }
    }

    /// Builds a string option around a default value.
    ///
    /// With a non-empty default the option is optional, never prompted for
    /// and the label shows the default. Without one the option is required
    /// and the label shows the help text, if any.
    pub fn with_default(label: &str, help: &str, flags: &[&str], default: &str) -> Self {
        let mut descriptor = Self::text(flags, label);

        if default.is_empty() {
            if !help.is_empty() {
                descriptor.label = format!("{label} ({help})");
            }
        } else {
            descriptor.label = format!("{label} [empty for: '{default}']");
            descriptor.optional = true;
            descriptor.skip_prompt = true;
        }

        descriptor.default = Some(OptionDefault::Constant(default.to_string()));

        descriptor
    }

    /// Prompt for this option even if it is a switch or has a default.
    pub fn ask(mut self) -> Self {
        self.skip_prompt = false;
        self
    }

    /// Never prompt for this option.
    pub fn no_prompt(mut self) -> Self {
        self.skip_prompt = true;
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Attaches a fallback value. Switches don't carry string values, so
    /// this is ignored for them.
    pub fn default_value(mut self, default: OptionDefault) -> Self {
        if !self.is_boolean {
            self.default = Some(default);
        }
        self
    }

    /// Renders the flags the way they are typed, e.g. `-o, --owner`.
    pub fn flag_summary(&self) -> String {
        self.flags
            .iter()
            .map(|flag| {
                if flag.chars().count() > 1 {
                    format!("--{flag}")
                } else {
                    format!("-{flag}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The resolved counterpart of an [`OptionDescriptor`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionValue {
    pub value: String,
    /// Set when a switch was passed as a flag or affirmed at the prompt.
    pub present: bool,
}

impl OptionValue {
    pub fn as_str(&self) -> &str {
        &self.value
    }
}
