use std::str::FromStr;

use crate::generation::{
    check_range, GenerationSettings, ValidationError, CFG_SCALE_RANGE, IMAGE_STRENGTH_RANGE,
    SAMPLES_RANGE, STEPS_RANGE,
};

use super::command_parser::is_none_word;
use super::command_registry::SettingKey;

fn invalid(key: SettingKey, raw: &str, reason: impl ToString) -> ValidationError {
    ValidationError::InvalidSetting {
        field: key.field(),
        value: raw.trim().to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T: FromStr>(key: SettingKey, raw: &str) -> Result<T, ValidationError>
where
    T::Err: ToString,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| invalid(key, raw, err))
}

fn parse_bounded_u32(
    key: SettingKey,
    raw: &str,
    (min, max): (u32, u32),
) -> Result<u32, ValidationError> {
    let value: u32 = parse(key, raw)?;
    check_range(key.field(), f64::from(value), (f64::from(min), f64::from(max)))?;
    Ok(value)
}

/// Parses `raw` for one setting and stores it. On error the settings are left
/// untouched.
pub fn apply_setting(
    settings: &mut GenerationSettings,
    key: SettingKey,
    raw: &str,
) -> Result<(), ValidationError> {
    match key {
        SettingKey::Mode => settings.mode = parse(key, raw)?,
        SettingKey::CfgScale => {
            let value: f64 = parse(key, raw)?;
            check_range(key.field(), value, CFG_SCALE_RANGE)?;
            settings.cfg_scale = value;
        }
        SettingKey::Steps => settings.steps = parse_bounded_u32(key, raw, STEPS_RANGE)?,
        SettingKey::Samples => settings.samples = parse_bounded_u32(key, raw, SAMPLES_RANGE)?,
        SettingKey::Seed => {
            settings.seed = if is_none_word(raw) {
                None
            } else {
                Some(parse(key, raw)?)
            };
        }
        SettingKey::Style => {
            settings.style_preset = if is_none_word(raw) {
                None
            } else {
                Some(parse(key, raw)?)
            };
        }
        SettingKey::ImageStrength => {
            settings.image_strength = if is_none_word(raw) {
                None
            } else {
                let value: f64 = parse(key, raw)?;
                check_range(key.field(), value, IMAGE_STRENGTH_RANGE)?;
                Some(value)
            };
        }
        SettingKey::UpscaleMode => {
            settings.upscale_mode = if is_none_word(raw) {
                None
            } else {
                Some(parse(key, raw)?)
            };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::generation::{GenerationMode, StylePreset, UpscaleMode};

    use super::*;

    #[test]
    fn values_are_parsed_into_settings() -> Result<(), ValidationError> {
        let mut settings = GenerationSettings::default();
        apply_setting(&mut settings, SettingKey::Mode, "img2img")?;
        apply_setting(&mut settings, SettingKey::CfgScale, "12.5")?;
        apply_setting(&mut settings, SettingKey::Steps, " 50 ")?;
        apply_setting(&mut settings, SettingKey::Seed, "77")?;
        apply_setting(&mut settings, SettingKey::Style, "neon punk")?;
        apply_setting(&mut settings, SettingKey::ImageStrength, "0.8")?;
        apply_setting(&mut settings, SettingKey::UpscaleMode, "creative")?;
        assert_eq!(settings.mode, GenerationMode::ImageToImage);
        assert_eq!(settings.cfg_scale, 12.5);
        assert_eq!(settings.steps, 50);
        assert_eq!(settings.seed, Some(77));
        assert_eq!(settings.style_preset, Some(StylePreset::NeonPunk));
        assert_eq!(settings.image_strength, Some(0.8));
        assert_eq!(settings.upscale_mode, Some(UpscaleMode::Creative));
        Ok(())
    }

    #[test]
    fn none_clears_optional_settings() -> Result<(), ValidationError> {
        let mut settings = GenerationSettings {
            seed: Some(5),
            style_preset: Some(StylePreset::Anime),
            ..GenerationSettings::default()
        };
        apply_setting(&mut settings, SettingKey::Seed, "none")?;
        apply_setting(&mut settings, SettingKey::Style, "off")?;
        assert_eq!(settings.seed, None);
        assert_eq!(settings.style_preset, None);
        Ok(())
    }

    #[test]
    fn bad_values_leave_settings_untouched() {
        let mut settings = GenerationSettings::default();
        assert!(matches!(
            apply_setting(&mut settings, SettingKey::Steps, "5"),
            Err(ValidationError::OutOfRange { field: "steps", .. })
        ));
        assert!(matches!(
            apply_setting(&mut settings, SettingKey::CfgScale, "lots"),
            Err(ValidationError::InvalidSetting { field: "cfg_scale", .. })
        ));
        assert!(matches!(
            apply_setting(&mut settings, SettingKey::Mode, "sketch"),
            Err(ValidationError::InvalidSetting { field: "mode", .. })
        ));
        assert!(apply_setting(&mut settings, SettingKey::Seed, "-1").is_err());
        assert_eq!(settings, GenerationSettings::default());
    }
}
