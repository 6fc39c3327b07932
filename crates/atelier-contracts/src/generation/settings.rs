use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CFG_SCALE: f64 = 7.0;
pub const DEFAULT_STEPS: u32 = 30;
pub const DEFAULT_SAMPLES: u32 = 1;
pub const DEFAULT_IMAGE_STRENGTH: f64 = 0.35;

pub const CFG_SCALE_RANGE: (f64, f64) = (0.0, 35.0);
pub const STEPS_RANGE: (u32, u32) = (10, 150);
pub const SAMPLES_RANGE: (u32, u32) = (1, 10);
pub const IMAGE_STRENGTH_RANGE: (f64, f64) = (0.0, 1.0);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    #[default]
    TextToImage,
    ImageToImage,
    Upscale,
}

impl GenerationMode {
    pub const ALL: [GenerationMode; 3] = [
        GenerationMode::TextToImage,
        GenerationMode::ImageToImage,
        GenerationMode::Upscale,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GenerationMode::TextToImage => "text-to-image",
            GenerationMode::ImageToImage => "image-to-image",
            GenerationMode::Upscale => "upscale",
        }
    }

    /// Lenient lookup used for free-form input. Anything unrecognized is
    /// treated as text-to-image.
    pub fn from_label(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    pub fn requires_init_image(self) -> bool {
        matches!(self, GenerationMode::ImageToImage | GenerationMode::Upscale)
    }

    pub fn uses_prompts(self) -> bool {
        !matches!(self, GenerationMode::Upscale)
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GenerationMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "text-to-image" | "txt2img" | "text" => Ok(GenerationMode::TextToImage),
            "image-to-image" | "img2img" | "image" => Ok(GenerationMode::ImageToImage),
            "upscale" => Ok(GenerationMode::Upscale),
            other => Err(format!("unknown generation mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpscaleMode {
    #[default]
    Fast,
    Creative,
    Conservative,
}

impl UpscaleMode {
    pub const ALL: [UpscaleMode; 3] = [
        UpscaleMode::Fast,
        UpscaleMode::Creative,
        UpscaleMode::Conservative,
    ];

    pub fn label(self) -> &'static str {
        match self {
            UpscaleMode::Fast => "fast",
            UpscaleMode::Creative => "creative",
            UpscaleMode::Conservative => "conservative",
        }
    }
}

impl fmt::Display for UpscaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for UpscaleMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        UpscaleMode::ALL
            .into_iter()
            .find(|mode| mode.label() == normalized)
            .ok_or_else(|| format!("unknown upscale mode '{normalized}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StylePreset {
    #[serde(rename = "3d-model")]
    ThreeDModel,
    AnalogFilm,
    Anime,
    Cinematic,
    ComicBook,
    DigitalArt,
    Enhance,
    FantasyArt,
    Isometric,
    LineArt,
    LowPoly,
    NeonPunk,
    Origami,
    Photographic,
    PixelArt,
    TileTexture,
}

impl StylePreset {
    pub const ALL: [StylePreset; 16] = [
        StylePreset::ThreeDModel,
        StylePreset::AnalogFilm,
        StylePreset::Anime,
        StylePreset::Cinematic,
        StylePreset::ComicBook,
        StylePreset::DigitalArt,
        StylePreset::Enhance,
        StylePreset::FantasyArt,
        StylePreset::Isometric,
        StylePreset::LineArt,
        StylePreset::LowPoly,
        StylePreset::NeonPunk,
        StylePreset::Origami,
        StylePreset::Photographic,
        StylePreset::PixelArt,
        StylePreset::TileTexture,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            StylePreset::ThreeDModel => "3d-model",
            StylePreset::AnalogFilm => "analog-film",
            StylePreset::Anime => "anime",
            StylePreset::Cinematic => "cinematic",
            StylePreset::ComicBook => "comic-book",
            StylePreset::DigitalArt => "digital-art",
            StylePreset::Enhance => "enhance",
            StylePreset::FantasyArt => "fantasy-art",
            StylePreset::Isometric => "isometric",
            StylePreset::LineArt => "line-art",
            StylePreset::LowPoly => "low-poly",
            StylePreset::NeonPunk => "neon-punk",
            StylePreset::Origami => "origami",
            StylePreset::Photographic => "photographic",
            StylePreset::PixelArt => "pixel-art",
            StylePreset::TileTexture => "tile-texture",
        }
    }
}

impl fmt::Display for StylePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for StylePreset {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        StylePreset::ALL
            .into_iter()
            .find(|preset| preset.slug() == normalized)
            .ok_or_else(|| format!("unknown style preset '{}'", raw.trim()))
    }
}

/// Parameters snapshotted with every generated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    pub mode: GenerationMode,
    pub cfg_scale: f64,
    pub steps: u32,
    pub samples: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_preset: Option<StylePreset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscale_mode: Option<UpscaleMode>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            mode: GenerationMode::TextToImage,
            cfg_scale: DEFAULT_CFG_SCALE,
            steps: DEFAULT_STEPS,
            samples: DEFAULT_SAMPLES,
            seed: None,
            style_preset: None,
            image_strength: None,
            upscale_mode: Some(UpscaleMode::Fast),
        }
    }
}

impl GenerationSettings {
    pub fn effective_upscale_mode(&self) -> UpscaleMode {
        self.upscale_mode.unwrap_or_default()
    }

    pub fn effective_image_strength(&self) -> f64 {
        self.image_strength.unwrap_or(DEFAULT_IMAGE_STRENGTH)
    }
}
