#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingKey {
    Mode,
    CfgScale,
    Steps,
    Samples,
    Seed,
    Style,
    ImageStrength,
    UpscaleMode,
}

impl SettingKey {
    pub fn field(self) -> &'static str {
        match self {
            SettingKey::Mode => "mode",
            SettingKey::CfgScale => "cfg_scale",
            SettingKey::Steps => "steps",
            SettingKey::Samples => "samples",
            SettingKey::Seed => "seed",
            SettingKey::Style => "style_preset",
            SettingKey::ImageStrength => "image_strength",
            SettingKey::UpscaleMode => "upscale_mode",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SettingSpec {
    pub command: &'static str,
    pub key: SettingKey,
}

pub(crate) const SETTING_COMMANDS: &[SettingSpec] = &[
    SettingSpec {
        command: "mode",
        key: SettingKey::Mode,
    },
    SettingSpec {
        command: "cfg",
        key: SettingKey::CfgScale,
    },
    SettingSpec {
        command: "steps",
        key: SettingKey::Steps,
    },
    SettingSpec {
        command: "samples",
        key: SettingKey::Samples,
    },
    SettingSpec {
        command: "seed",
        key: SettingKey::Seed,
    },
    SettingSpec {
        command: "style",
        key: SettingKey::Style,
    },
    SettingSpec {
        command: "strength",
        key: SettingKey::ImageStrength,
    },
    SettingSpec {
        command: "upscale",
        key: SettingKey::UpscaleMode,
    },
];

pub(crate) const IMAGE_COMMAND: &str = "image";
pub(crate) const PROMPT_COMMAND: &str = "prompt";
pub(crate) const SHOW_COMMAND: &str = "show";
pub(crate) const DELETE_COMMAND: &str = "delete";
pub(crate) const EXPORT_COMMAND: &str = "export";

pub(crate) const NO_ARG_COMMANDS: &[&str] = &[
    "go", "prompts", "settings", "gallery", "clear", "help", "quit", "exit",
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/mode <text-to-image|image-to-image|upscale>",
    "/cfg <0-35>",
    "/steps <10-150>",
    "/samples <1-10>",
    "/seed <n|none>",
    "/style <preset|none>",
    "/strength <0-1|none>",
    "/upscale <fast|creative|conservative>",
    "/image <path|none>",
    "/prompt add <text[::weight]>",
    "/prompt rm <n>",
    "/prompt weight <n> <weight>",
    "/prompt set <n> <text>",
    "/prompts",
    "/settings",
    "/go",
    "/gallery",
    "/show <id>",
    "/delete <id>",
    "/export <id> <path>",
    "/clear",
    "/help",
    "/quit",
];

pub(crate) fn find_setting(command: &str) -> Option<SettingKey> {
    SETTING_COMMANDS
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.key)
}
