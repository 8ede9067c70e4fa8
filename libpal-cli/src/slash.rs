//! Slash commands understood by the REPL.

/// Metadata describing a slash command.
#[derive(Debug, Clone)]
pub struct CommandInfo {
    /// Primary name including the slash, e.g. "/add".
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub usage: &'static str,
}

const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "/add",
        aliases: &["/load"],
        description: "Add .txt, .md, .pdf or .docx files to the knowledge base",
        usage: "/add <path> [path...]",
    },
    CommandInfo {
        name: "/sources",
        aliases: &["/cite"],
        description: "Show the passages behind the last answer",
        usage: "/sources",
    },
    CommandInfo {
        name: "/status",
        aliases: &["/docs"],
        description: "List loaded documents and backends",
        usage: "/status",
    },
    CommandInfo {
        name: "/clear",
        aliases: &[],
        description: "Forget the conversation, keep the documents",
        usage: "/clear",
    },
    CommandInfo {
        name: "/reset",
        aliases: &[],
        description: "Remove all documents and the conversation",
        usage: "/reset",
    },
    CommandInfo {
        name: "/help",
        aliases: &["/?"],
        description: "Show this help",
        usage: "/help",
    },
    CommandInfo {
        name: "/quit",
        aliases: &["/exit", "/q"],
        description: "Exit libpal",
        usage: "/quit",
    },
];

/// A parsed REPL command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Add(Vec<String>),
    Sources,
    Status,
    Clear,
    Reset,
    Help,
    Quit,
    Unknown(String),
}

/// Look up a command by name or alias.
pub fn lookup(name: &str) -> Option<&'static CommandInfo> {
    COMMANDS
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Parse a line starting with `/`. Returns `None` for ordinary questions.
pub fn parse(input: &str) -> Option<SlashCommand> {
    let input = input.trim();
    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input.split_whitespace();
    let head = parts.next().unwrap_or(input);
    let args: Vec<String> = parts.map(str::to_string).collect();

    let command = match lookup(head).map(|c| c.name) {
        Some("/add") => SlashCommand::Add(args),
        Some("/sources") => SlashCommand::Sources,
        Some("/status") => SlashCommand::Status,
        Some("/clear") => SlashCommand::Clear,
        Some("/reset") => SlashCommand::Reset,
        Some("/help") => SlashCommand::Help,
        Some("/quit") => SlashCommand::Quit,
        _ => SlashCommand::Unknown(head.to_string()),
    };
    Some(command)
}

pub fn help_text() -> String {
    let mut output = String::from("\nAvailable commands:\n");
    for cmd in COMMANDS {
        let aliases = if cmd.aliases.is_empty() {
            String::new()
        } else {
            format!(" ({})", cmd.aliases.join(", "))
        };
        output.push_str(&format!(
            "    {:<24} {}{}\n",
            cmd.usage, cmd.description, aliases
        ));
    }
    output.push_str("\nInput:\n  Type a question about your documents and press Enter.\n");
    output
}
