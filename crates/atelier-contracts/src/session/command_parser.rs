use crate::generation::WeightedPrompt;

use super::command_registry::{
    find_setting, SettingKey, DELETE_COMMAND, EXPORT_COMMAND, IMAGE_COMMAND, NO_ARG_COMMANDS,
    PROMPT_COMMAND, SHOW_COMMAND,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PromptEdit {
    Add(WeightedPrompt),
    /// Positions are 1-based, as shown to the user.
    Remove(usize),
    Weight { position: usize, weight: f64 },
    Set { position: usize, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Noop,
    /// Free text replaces the first prompt before generating; `/go` submits
    /// the current prompts unchanged.
    Generate { prompt: Option<String> },
    Set { key: SettingKey, value: String },
    /// `None` drops the current init image.
    InitImage { path: Option<String> },
    Prompt(PromptEdit),
    ListPrompts,
    ShowSettings,
    Gallery,
    Show { id: String },
    Delete { id: String },
    Export { id: String, path: String },
    Clear,
    Help,
    Quit,
    Invalid { command: String, reason: String },
    Unknown { command: String, arg: String },
}

fn parse_args(arg: &str) -> Vec<String> {
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

fn invalid(command: &str, reason: impl Into<String>) -> SessionCommand {
    SessionCommand::Invalid {
        command: command.to_string(),
        reason: reason.into(),
    }
}

fn parse_position(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|position| *position > 0)
}

pub(super) fn is_none_word(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "none" | "off" | "clear"
    )
}

fn parse_prompt_edit(arg: &str) -> SessionCommand {
    let (verb, rest) = match arg.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb.to_ascii_lowercase(), rest.trim()),
        None => (arg.trim().to_ascii_lowercase(), ""),
    };
    match verb.as_str() {
        "add" => {
            if rest.is_empty() {
                return invalid(PROMPT_COMMAND, "/prompt add needs text");
            }
            SessionCommand::Prompt(PromptEdit::Add(WeightedPrompt::parse(rest)))
        }
        "rm" | "remove" => match parse_position(Some(rest)) {
            Some(position) => SessionCommand::Prompt(PromptEdit::Remove(position)),
            None => invalid(PROMPT_COMMAND, "/prompt rm needs a prompt number"),
        },
        "weight" => {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            let position = parse_position(parts.first().copied());
            let weight = parts.get(1).and_then(|value| value.parse::<f64>().ok());
            match (position, weight, parts.len()) {
                (Some(position), Some(weight), 2) => {
                    SessionCommand::Prompt(PromptEdit::Weight { position, weight })
                }
                _ => invalid(PROMPT_COMMAND, "usage: /prompt weight <n> <weight>"),
            }
        }
        "set" => {
            let (position, text) = match rest.split_once(char::is_whitespace) {
                Some((position, text)) => (parse_position(Some(position)), text.trim()),
                None => (parse_position(Some(rest)), ""),
            };
            match position {
                Some(position) => SessionCommand::Prompt(PromptEdit::Set {
                    position,
                    text: text.to_string(),
                }),
                None => invalid(PROMPT_COMMAND, "usage: /prompt set <n> <text>"),
            }
        }
        _ => invalid(PROMPT_COMMAND, "expected add, rm, weight or set"),
    }
}

pub fn parse_command(text: &str) -> SessionCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return SessionCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return SessionCommand::Generate {
            prompt: Some(raw_trimmed.to_string()),
        };
    };

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return SessionCommand::Generate {
            prompt: Some(raw_trimmed.to_string()),
        };
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if let Some(key) = find_setting(&command) {
        if arg.is_empty() {
            return invalid(&command, format!("/{command} needs a value"));
        }
        return SessionCommand::Set {
            key,
            value: arg.to_string(),
        };
    }

    match command.as_str() {
        IMAGE_COMMAND => {
            let joined = parse_args(arg).join(" ");
            SessionCommand::InitImage {
                path: (!is_none_word(&joined)).then_some(joined),
            }
        }
        PROMPT_COMMAND => parse_prompt_edit(arg),
        SHOW_COMMAND | DELETE_COMMAND => {
            let parts = parse_args(arg);
            let [id] = parts.as_slice() else {
                return invalid(&command, format!("usage: /{command} <id>"));
            };
            if command == SHOW_COMMAND {
                SessionCommand::Show { id: id.clone() }
            } else {
                SessionCommand::Delete { id: id.clone() }
            }
        }
        EXPORT_COMMAND => {
            let parts = parse_args(arg);
            let [id, path] = parts.as_slice() else {
                return invalid(&command, "usage: /export <id> <path>");
            };
            SessionCommand::Export {
                id: id.clone(),
                path: path.clone(),
            }
        }
        _ if NO_ARG_COMMANDS.contains(&command.as_str()) => match command.as_str() {
            "go" => SessionCommand::Generate { prompt: None },
            "prompts" => SessionCommand::ListPrompts,
            "settings" => SessionCommand::ShowSettings,
            "gallery" => SessionCommand::Gallery,
            "clear" => SessionCommand::Clear,
            "help" => SessionCommand::Help,
            _ => SessionCommand::Quit,
        },
        _ => SessionCommand::Unknown {
            command,
            arg: arg.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_generates() {
        assert_eq!(
            parse_command("  a castle at dusk  "),
            SessionCommand::Generate {
                prompt: Some("a castle at dusk".to_string())
            }
        );
        assert_eq!(parse_command("   "), SessionCommand::Noop);
        assert_eq!(
            parse_command("/go"),
            SessionCommand::Generate { prompt: None }
        );
    }

    #[test]
    fn setting_commands_keep_raw_values() {
        assert_eq!(
            parse_command("/cfg 12.5"),
            SessionCommand::Set {
                key: SettingKey::CfgScale,
                value: "12.5".to_string()
            }
        );
        assert_eq!(
            parse_command("/STYLE neon punk"),
            SessionCommand::Set {
                key: SettingKey::Style,
                value: "neon punk".to_string()
            }
        );
        assert!(matches!(
            parse_command("/steps"),
            SessionCommand::Invalid { .. }
        ));
    }

    #[test]
    fn image_command_accepts_quoted_paths_and_none() {
        assert_eq!(
            parse_command("/image \"/tmp/my photo.png\""),
            SessionCommand::InitImage {
                path: Some("/tmp/my photo.png".to_string())
            }
        );
        assert_eq!(
            parse_command("/image none"),
            SessionCommand::InitImage { path: None }
        );
    }

    #[test]
    fn prompt_edits_parse_positions_and_weights() {
        assert_eq!(
            parse_command("/prompt add misty hills::0.5"),
            SessionCommand::Prompt(PromptEdit::Add(WeightedPrompt::new("misty hills", 0.5)))
        );
        assert_eq!(
            parse_command("/prompt rm 2"),
            SessionCommand::Prompt(PromptEdit::Remove(2))
        );
        assert_eq!(
            parse_command("/prompt weight 1 -3"),
            SessionCommand::Prompt(PromptEdit::Weight {
                position: 1,
                weight: -3.0
            })
        );
        assert_eq!(
            parse_command("/prompt set 3 a quiet harbor"),
            SessionCommand::Prompt(PromptEdit::Set {
                position: 3,
                text: "a quiet harbor".to_string()
            })
        );
        assert!(matches!(
            parse_command("/prompt rm 0"),
            SessionCommand::Invalid { .. }
        ));
        assert!(matches!(
            parse_command("/prompt weight 1"),
            SessionCommand::Invalid { .. }
        ));
    }

    #[test]
    fn gallery_commands_take_ids() {
        assert_eq!(
            parse_command("/delete abc-123"),
            SessionCommand::Delete {
                id: "abc-123".to_string()
            }
        );
        assert_eq!(
            parse_command("/export abc \"/tmp/out file.png\""),
            SessionCommand::Export {
                id: "abc".to_string(),
                path: "/tmp/out file.png".to_string()
            }
        );
        assert!(matches!(
            parse_command("/show"),
            SessionCommand::Invalid { .. }
        ));
        assert_eq!(parse_command("/gallery"), SessionCommand::Gallery);
        assert_eq!(parse_command("/exit"), SessionCommand::Quit);
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert_eq!(
            parse_command("/magic foo bar"),
            SessionCommand::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string()
            }
        );
    }
}
