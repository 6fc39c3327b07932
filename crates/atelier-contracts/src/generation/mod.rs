mod settings;
mod validation;

use serde::{Deserialize, Serialize};

pub use settings::{
    GenerationMode, GenerationSettings, StylePreset, UpscaleMode, CFG_SCALE_RANGE,
    DEFAULT_CFG_SCALE, DEFAULT_IMAGE_STRENGTH, DEFAULT_SAMPLES, DEFAULT_STEPS,
    IMAGE_STRENGTH_RANGE, SAMPLES_RANGE, STEPS_RANGE,
};
pub(crate) use validation::check_range;
pub use validation::{ValidationError, MAX_INIT_IMAGE_BYTES, MAX_PROMPTS, WEIGHT_RANGE};

pub const DEFAULT_PROMPT_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPrompt {
    pub text: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    DEFAULT_PROMPT_WEIGHT
}

impl WeightedPrompt {
    pub fn new(text: impl Into<String>, weight: f64) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }

    /// Parses `text` or `text::weight`. A suffix that is not a number is kept
    /// as part of the text.
    pub fn parse(raw: &str) -> Self {
        if let Some((text, weight)) = raw.rsplit_once("::") {
            if let Ok(weight) = weight.trim().parse::<f64>() {
                return Self::new(text.trim(), weight);
            }
        }
        Self::new(raw.trim(), DEFAULT_PROMPT_WEIGHT)
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl Default for WeightedPrompt {
    fn default() -> Self {
        Self::new("", DEFAULT_PROMPT_WEIGHT)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationRequest {
    pub prompts: Vec<WeightedPrompt>,
    pub settings: GenerationSettings,
    /// Base64 payload, optionally wrapped in a `data:` URI.
    pub init_image: Option<String>,
}

impl GenerationRequest {
    pub fn text_to_image(prompts: Vec<WeightedPrompt>, settings: GenerationSettings) -> Self {
        Self {
            prompts,
            settings: GenerationSettings {
                mode: GenerationMode::TextToImage,
                ..settings
            },
            init_image: None,
        }
    }

    pub fn mode(&self) -> GenerationMode {
        self.settings.mode
    }

    /// Prompts that will actually be sent: none for upscale, otherwise the
    /// non-blank ones in order.
    pub fn submitted_prompts(&self) -> Vec<WeightedPrompt> {
        if !self.mode().uses_prompts() {
            return Vec::new();
        }
        self.prompts
            .iter()
            .filter(|prompt| !prompt.is_blank())
            .map(|prompt| WeightedPrompt::new(prompt.text.trim(), prompt.weight))
            .collect()
    }

    /// Human-readable label stored alongside a generated image.
    pub fn display_prompt(&self) -> String {
        let prompts = self.submitted_prompts();
        if prompts.is_empty() {
            return match self.mode() {
                GenerationMode::Upscale => {
                    format!("upscale ({})", self.settings.effective_upscale_mode())
                }
                mode => mode.label().to_string(),
            };
        }
        prompts
            .iter()
            .map(|prompt| format!("{} ({})", prompt.text, prompt.weight))
            .collect::<Vec<String>>()
            .join(" | ")
    }

    pub fn init_image(&self) -> Option<&str> {
        self.init_image
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Normalized outcome shared by every generation mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub image_base64: String,
    pub seed: u64,
    pub finish_reason: String,
}
