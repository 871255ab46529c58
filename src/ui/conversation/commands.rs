use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a new conversation
    New,
    /// Delete the active conversation
    Delete,
    /// Switch model (cycles suggestions without an argument)
    Model,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "start a new conversation",
            SlashCommand::Delete => "delete the active conversation",
            SlashCommand::Model => "switch model (/model <name>, or cycle suggestions)",
            SlashCommand::Help => "show commands and key bindings",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(&head.to_lowercase())
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "exit" | "bye" => Some(SlashCommand::Quit),
            "n" => Some(SlashCommand::New),
            "rm" | "del" => Some(SlashCommand::Delete),
            "m" | "models" => Some(SlashCommand::Model),
            "h" | "?" => Some(SlashCommand::Help),
            _ => None,
        })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Commands:\n\n");
    for entry in command_entries() {
        help.push_str(&format!("  /{:<8} {}\n", entry.keyword, entry.description));
    }

    help.push_str("\nKeys:\n\n");
    for (keys, description) in [
        ("Enter", "send message"),
        ("Shift+Enter", "new line (Alt+Enter also works)"),
        ("Ctrl+N", "new conversation"),
        ("Ctrl+L", "cycle suggested models"),
        ("Ctrl+E", "send the sample prompt"),
        ("Tab", "switch focus between sidebar and input"),
        ("PgUp/PgDn", "scroll the transcript"),
        ("Esc/Ctrl+C", "quit"),
    ] {
        help.push_str(&format!("  {:<12} {}\n", keys, description));
    }

    help
}
