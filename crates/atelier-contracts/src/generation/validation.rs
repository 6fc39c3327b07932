use thiserror::Error;

use super::settings::{CFG_SCALE_RANGE, IMAGE_STRENGTH_RANGE, SAMPLES_RANGE, STEPS_RANGE};
use super::{GenerationMode, GenerationRequest};

pub const MAX_PROMPTS: usize = 5;
pub const WEIGHT_RANGE: (f64, f64) = (-10.0, 10.0);
/// Upload cap for init images.
pub const MAX_INIT_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Please upload an image first ({0} needs an init image)")]
    MissingInitImage(GenerationMode),
    #[error("Enter at least one prompt")]
    EmptyPrompt,
    #[error("At most {max} prompts are allowed, got {0}", max = MAX_PROMPTS)]
    TooManyPrompts(usize),
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Image must be less than 10MB ({0} bytes)")]
    ImageTooLarge(usize),
    #[error("invalid {field} '{value}': {reason}")]
    InvalidSetting {
        field: &'static str,
        value: String,
        reason: String,
    },
}

pub(crate) fn check_range(
    field: &'static str,
    value: f64,
    (min, max): (f64, f64),
) -> Result<(), ValidationError> {
    if value.is_nan() || value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl GenerationRequest {
    /// Client-side precondition checks, run before anything touches the
    /// network.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mode = self.mode();
        if mode.requires_init_image() && self.init_image().is_none() {
            return Err(ValidationError::MissingInitImage(mode));
        }
        if !mode.uses_prompts() {
            return Ok(());
        }

        if self.prompts.len() > MAX_PROMPTS {
            return Err(ValidationError::TooManyPrompts(self.prompts.len()));
        }
        let prompts = self.submitted_prompts();
        if mode == GenerationMode::TextToImage && prompts.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        for prompt in &prompts {
            check_range("weight", prompt.weight, WEIGHT_RANGE)?;
        }

        let settings = &self.settings;
        check_range("cfg_scale", settings.cfg_scale, CFG_SCALE_RANGE)?;
        check_range(
            "steps",
            f64::from(settings.steps),
            (f64::from(STEPS_RANGE.0), f64::from(STEPS_RANGE.1)),
        )?;
        check_range(
            "samples",
            f64::from(settings.samples),
            (f64::from(SAMPLES_RANGE.0), f64::from(SAMPLES_RANGE.1)),
        )?;
        if mode == GenerationMode::ImageToImage {
            if let Some(strength) = settings.image_strength {
                check_range("image_strength", strength, IMAGE_STRENGTH_RANGE)?;
            }
        }
        Ok(())
    }
}
