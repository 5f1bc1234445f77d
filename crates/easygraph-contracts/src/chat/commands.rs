#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    pub command: &'static str,
    pub usage: &'static str,
}

pub const CHAT_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        usage: "/help",
    },
    CommandSpec {
        command: "attach",
        usage: "/attach <path> [path...]",
    },
    CommandSpec {
        command: "detach",
        usage: "/detach",
    },
    CommandSpec {
        command: "save",
        usage: "/save <name>",
    },
    CommandSpec {
        command: "new",
        usage: "/new",
    },
    CommandSpec {
        command: "projects",
        usage: "/projects",
    },
    CommandSpec {
        command: "load",
        usage: "/load <project-id>",
    },
    CommandSpec {
        command: "delete",
        usage: "/delete <project-id>",
    },
    CommandSpec {
        command: "render",
        usage: "/render [out.json]",
    },
    CommandSpec {
        command: "quit",
        usage: "/quit",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatIntent {
    Noop,
    Help,
    Attach(Vec<String>),
    Detach,
    Save(String),
    New,
    Projects,
    Load(String),
    Delete(String),
    Render(Option<String>),
    Quit,
    Send(String),
    Unknown { command: String, arg: String },
}

pub fn help_lines() -> Vec<&'static str> {
    CHAT_COMMANDS.iter().map(|spec| spec.usage).collect()
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    }
}

fn single_path(arg: &str) -> Option<String> {
    let parts = parse_path_args(arg);
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Slash commands drive the session; anything else is a chart request.
pub fn parse_intent(text: &str) -> ChatIntent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ChatIntent::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return ChatIntent::Send(raw_trimmed.to_string());
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return ChatIntent::Send(raw_trimmed.to_string());
    }

    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    match command.as_str() {
        "help" => ChatIntent::Help,
        "attach" => ChatIntent::Attach(parse_path_args(arg)),
        "detach" => ChatIntent::Detach,
        "save" if !arg.is_empty() => ChatIntent::Save(arg.to_string()),
        "new" => ChatIntent::New,
        "projects" => ChatIntent::Projects,
        "load" if !arg.is_empty() => ChatIntent::Load(arg.to_string()),
        "delete" if !arg.is_empty() => ChatIntent::Delete(arg.to_string()),
        "render" => ChatIntent::Render(single_path(arg)),
        "quit" | "exit" => ChatIntent::Quit,
        _ => ChatIntent::Unknown {
            command,
            arg: arg.to_string(),
        },
    }
}
