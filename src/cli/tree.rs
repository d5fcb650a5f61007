//! The command tree: maps token sequences such as `new pr` to commands.

use std::rc::Rc;

use crate::cli::{
    Session,
    option::{OptionDescriptor, OptionValue},
};

/// Runs a command once its options have been resolved. The values are paired
/// by index with [`Command::options`].
pub type Handler = fn(&mut Session, &[OptionValue]) -> anyhow::Result<()>;

/// What a command needs from the configuration file. It is checked before
/// any option is resolved, so nothing is prompted for a command that cannot
/// run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Requires {
    #[default]
    Nothing,
    /// A valid configuration file.
    Config,
    /// A valid configuration file holding credentials.
    Credentials,
}

pub struct Command {
    pub description: String,
    pub requires: Requires,
    pub handler: Handler,
    pub options: Vec<OptionDescriptor>,
}

impl Command {
    pub fn new(description: &str, handler: Handler, options: Vec<OptionDescriptor>) -> Rc<Self> {
        Self::requiring(Requires::Nothing, description, handler, options)
    }

    pub fn requiring(
        requires: Requires,
        description: &str,
        handler: Handler,
        options: Vec<OptionDescriptor>,
    ) -> Rc<Self> {
        Rc::new(Self {
            description: description.to_string(),
            requires,
            handler,
            options,
        })
    }
}

/// A node of the command tree. Sibling labels are unique.
#[derive(Default)]
pub struct Branch {
    pub label: String,
    pub command: Option<Rc<Command>>,
    pub branches: Vec<Branch>,
}

impl Branch {
    /// Registers `command` under `path`, matching only in that order.
    ///
    /// # Panics
    ///
    /// Panics if a command is already registered under `path`.
    pub fn insert_fixed_order(&mut self, command: Rc<Command>, path: &[&str]) {
        let mut branch = self;

        for label in path {
            branch = branch.find_or_insert(label);
        }

        branch.set_command(command);
    }

    /// Registers `command` under every ordering of `path`.
    ///
    /// Each element is peeled off in turn and the remainder is inserted below
    /// it, so this is O(n!) in the path length. Paths are kept to three or
    /// four tokens.
    ///
    /// # Panics
    ///
    /// Panics if any ordering of `path` already holds a command.
    pub fn insert_any_order(&mut self, command: Rc<Command>, path: &[&str]) {
        for index in 0..path.len() {
            let branch = self.find_or_insert(path[index]);

            if path.len() == 1 {
                branch.set_command(command);
                return;
            }

            branch.insert_any_order(Rc::clone(&command), &without(path, index));
        }
    }

    /// Looks up the command for `tokens`.
    ///
    /// Tokens are tried in order against the children of this branch. The
    /// first token that matches is consumed and the lookup continues below
    /// the matched branch with the remaining tokens; there is no
    /// backtracking if that path turns out to be a dead end.
    pub fn find_command(&self, tokens: &[String]) -> Option<&Rc<Command>> {
        for (index, token) in tokens.iter().enumerate() {
            let Some(branch) = self.branches.iter().find(|b| &b.label == token) else {
                continue;
            };

            if index == tokens.len() - 1 {
                return branch.command.as_ref();
            }

            return branch.find_command(&without(tokens, index));
        }

        None
    }

    /// All registered commands with the labels leading to them, depth first
    /// in registration order.
    pub fn commands(&self) -> Vec<(Vec<&str>, &Rc<Command>)> {
        let mut commands = Vec::new();

        self.collect_commands(&mut Vec::new(), &mut commands);

        commands
    }

    fn collect_commands<'a>(
        &'a self,
        path: &mut Vec<&'a str>,
        commands: &mut Vec<(Vec<&'a str>, &'a Rc<Command>)>,
    ) {
        for branch in &self.branches {
            path.push(&branch.label);

            if let Some(command) = &branch.command {
                commands.push((path.clone(), command));
            }

            branch.collect_commands(path, commands);
            path.pop();
        }
    }

    fn find_or_insert(&mut self, label: &str) -> &mut Branch {
        let index = match self.branches.iter().position(|b| b.label == label) {
            Some(index) => index,
            None => {
                self.branches.push(Branch {
                    label: label.to_string(),
                    ..Default::default()
                });

                self.branches.len() - 1
            }
        };

        &mut self.branches[index]
    }

    fn set_command(&mut self, command: Rc<Command>) {
        if self.command.is_some() {
            panic!(
                "tried to add a duplicate command under '{}' into the command tree",
                self.label
            );
        }

        self.command = Some(command);
    }
}

fn without<T: Clone>(items: &[T], index: usize) -> Vec<T> {
    items
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, item)| item.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Session, _: &[OptionValue]) -> anyhow::Result<()> {
        Ok(())
    }

    fn command(description: &str) -> Rc<Command> {
        Command::new(description, noop, Vec::new())
    }

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn find<'a>(root: &'a Branch, values: &[&str]) -> Option<&'a str> {
        root.find_command(&tokens(values))
            .map(|c| c.description.as_str())
    }

    #[test]
    fn test_any_order_matches_every_order() {
        let mut root = Branch::default();

        root.insert_any_order(command("new cred"), &["new", "cred"]);

        assert_eq!(find(&root, &["cred", "new"]), Some("new cred"));
        assert_eq!(find(&root, &["new", "cred"]), Some("new cred"));
    }

    #[test]
    fn test_any_order_three_tokens() {
        let mut root = Branch::default();

        root.insert_any_order(command("new g cred"), &["new", "g", "cred"]);

        for order in [
            ["new", "g", "cred"],
            ["new", "cred", "g"],
            ["g", "new", "cred"],
            ["g", "cred", "new"],
            ["cred", "new", "g"],
            ["cred", "g", "new"],
        ] {
            assert_eq!(find(&root, &order), Some("new g cred"), "order: {order:?}");
        }
    }

    #[test]
    fn test_fixed_order_is_enforced() {
        let mut root = Branch::default();

        root.insert_fixed_order(command("new pr"), &["new", "pr"]);

        assert_eq!(find(&root, &["new", "pr"]), Some("new pr"));
        assert_eq!(find(&root, &["pr", "new"]), None);
    }

    #[test]
    fn test_prefix_without_command_is_not_found() {
        let mut root = Branch::default();

        root.insert_fixed_order(command("new pr"), &["new", "pr"]);

        assert_eq!(find(&root, &["new"]), None);
        assert_eq!(find(&root, &[]), None);
        assert_eq!(find(&root, &["bogus"]), None);
    }

    #[test]
    fn test_extra_token_is_not_found() {
        let mut root = Branch::default();

        root.insert_fixed_order(command("new pr"), &["new", "pr"]);

        assert_eq!(find(&root, &["new", "pr", "now"]), None);
    }

    #[test]
    fn test_unmatched_tokens_are_skipped_at_each_level() {
        let mut root = Branch::default();

        root.insert_fixed_order(command("merge pr"), &["merge", "pr"]);

        assert_eq!(find(&root, &["pr", "merge"]), None);
        assert_eq!(find(&root, &["bogus", "merge", "pr"]), None);
    }

    #[test]
    fn test_nested_commands_coexist() {
        let mut root = Branch::default();

        root.insert_fixed_order(command("new g cred"), &["new", "g", "cred"]);
        root.insert_any_order(command("new cred"), &["new", "cred"]);

        assert_eq!(find(&root, &["new", "g", "cred"]), Some("new g cred"));
        assert_eq!(find(&root, &["cred", "new"]), Some("new cred"));
    }

    #[test]
    #[should_panic(expected = "duplicate command")]
    fn test_duplicate_fixed_order_panics() {
        let mut root = Branch::default();

        root.insert_fixed_order(command("a"), &["new", "pr"]);
        root.insert_fixed_order(command("b"), &["new", "pr"]);
    }

    #[test]
    #[should_panic(expected = "duplicate command")]
    fn test_any_order_colliding_with_fixed_order_panics() {
        let mut root = Branch::default();

        root.insert_fixed_order(command("a"), &["cred", "rm"]);
        root.insert_any_order(command("b"), &["rm", "cred"]);
    }

    // The lookup is greedy: once a token matches, no other arrangement is
    // tried. Here "b a c" could reach "a b c" by consuming "a" first, but "b"
    // matches at the root and leads to a dead end.
    #[test]
    fn test_first_match_without_backtracking() {
        let mut root = Branch::default();

        root.insert_fixed_order(command("abc"), &["a", "b", "c"]);

        assert_eq!(find(&root, &["b", "a", "c"]), Some("abc"));

        root.insert_fixed_order(command("bx"), &["b", "x"]);

        assert_eq!(find(&root, &["b", "a", "c"]), None);
        assert_eq!(find(&root, &["a", "b", "c"]), Some("abc"));
    }

    #[test]
    fn test_commands_lists_paths_in_registration_order() {
        let mut root = Branch::default();

        root.insert_fixed_order(command("new pr"), &["new", "pr"]);
        root.insert_any_order(command("help"), &["help"]);

        let listed = root
            .commands()
            .into_iter()
            .map(|(path, c)| (path.join(" "), c.description.clone()))
            .collect::<Vec<_>>();

        assert_eq!(
            listed,
            vec![
                ("new pr".to_string(), "new pr".to_string()),
                ("help".to_string(), "help".to_string())
            ]
        );
    }
}
