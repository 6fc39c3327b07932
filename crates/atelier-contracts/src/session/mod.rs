//! Slash-command grammar for the interactive generation session.

mod apply;
mod command_parser;
mod command_registry;

pub use apply::apply_setting;
pub use command_parser::{parse_command, PromptEdit, SessionCommand};
pub use command_registry::{SettingKey, SESSION_HELP_COMMANDS};
