mod commands;
mod message;

pub use commands::{help_lines, parse_intent, ChatIntent, CommandSpec, CHAT_COMMANDS};
pub use message::{Attachment, AttachmentKind, InlineFile, Message, Role, TURN_ERROR_REPLY};
