use crate::catalog::normalize_asset_name;

/// Every command starts with this.
pub const COMMAND_PREFIX: &str = "!aku";

/// Text commands understood by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `!aku <name>`: play a sound in the invoker's voice channel
    Play(String),
    /// `!akuh [category]`: browse sound categories or one category
    AudioHelp(Option<String>),
    /// `!akus <name>`: post a sticker
    Sticker(String),
    /// `!akush [pack]`: browse sticker packs or one pack's pages
    StickerHelp(Option<String>),
}

/// Parses a chat message into a command.
///
/// The argument is everything after the first space, trimmed, with spaces
/// turned into underscores to match asset names.
pub fn parse_command(content: &str) -> Option<Command> {
    let content = content.trim();
    if !content.starts_with(COMMAND_PREFIX) {
        return None;
    }

    let (name, argument) = match content.split_once(' ') {
        Some((name, argument)) => (name, normalize_asset_name(argument)),
        None => (content, String::new()),
    };
    let optional = |argument: String| (!argument.is_empty()).then_some(argument);

    match name {
        "!aku" => optional(argument).map(Command::Play),
        "!akuh" => Some(Command::AudioHelp(optional(argument))),
        "!akus" => optional(argument).map(Command::Sticker),
        "!akush" => Some(Command::StickerHelp(optional(argument))),
        _ => None,
    }
}
