use atelier_contracts::generation::{GenerationMode, UpscaleMode};

pub const TEXT_TO_IMAGE: &str = "/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image";
pub const IMAGE_TO_IMAGE: &str = "/v1/generation/stable-diffusion-xl-1024-v1-0/image-to-image";
pub const UPSCALE_FAST: &str = "/v2beta/stable-image/upscale/fast";
pub const UPSCALE_CREATIVE: &str = "/v2beta/stable-image/upscale/creative";
pub const UPSCALE_CONSERVATIVE: &str = "/v2beta/stable-image/upscale/conservative";

pub const ALL_ENDPOINTS: [&str; 5] = [
    TEXT_TO_IMAGE,
    IMAGE_TO_IMAGE,
    UPSCALE_FAST,
    UPSCALE_CREATIVE,
    UPSCALE_CONSERVATIVE,
];

/// Request path for a mode. The upscale algorithm only matters in upscale
/// mode and defaults to fast.
pub fn endpoint_for(mode: GenerationMode, upscale_mode: Option<UpscaleMode>) -> &'static str {
    match mode {
        GenerationMode::TextToImage => TEXT_TO_IMAGE,
        GenerationMode::ImageToImage => IMAGE_TO_IMAGE,
        GenerationMode::Upscale => match upscale_mode.unwrap_or_default() {
            UpscaleMode::Fast => UPSCALE_FAST,
            UpscaleMode::Creative => UPSCALE_CREATIVE,
            UpscaleMode::Conservative => UPSCALE_CONSERVATIVE,
        },
    }
}

/// Same mapping keyed by a free-form mode label; unknown labels resolve to
/// text-to-image.
pub fn endpoint_for_label(mode: &str, upscale_mode: Option<UpscaleMode>) -> &'static str {
    endpoint_for(GenerationMode::from_label(mode), upscale_mode)
}
