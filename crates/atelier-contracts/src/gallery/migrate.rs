use serde_json::Value;

use super::{GeneratedImage, ImageCacheState, CURRENT_SCHEMA_VERSION};

/// Upgrades any persisted payload to the current [`ImageCacheState`].
///
/// - no version marker: the oldest format, upgraded in place with missing
///   fields defaulted
/// - current version: passed through
/// - anything newer: there is no downgrade path, so it loads as empty
///
/// Never fails; unusable input yields an empty current-version state.
pub fn migrate(payload: Value) -> ImageCacheState {
    let Some(obj) = payload.as_object() else {
        return ImageCacheState::default();
    };

    // `version` is the marker name used by the oldest writers.
    let version = obj
        .get("schemaVersion")
        .or_else(|| obj.get("version"))
        .and_then(Value::as_u64);

    match version {
        None | Some(0) => ImageCacheState {
            schema_version: CURRENT_SCHEMA_VERSION,
            images: lenient_images(obj.get("images")),
        },
        Some(version) if version == u64::from(CURRENT_SCHEMA_VERSION) => {
            serde_json::from_value::<ImageCacheState>(payload.clone()).unwrap_or_else(|_| {
                ImageCacheState {
                    schema_version: CURRENT_SCHEMA_VERSION,
                    images: lenient_images(obj.get("images")),
                }
            })
        }
        Some(version) => {
            tracing::warn!(
                version,
                current = CURRENT_SCHEMA_VERSION,
                "persisted image cache is newer than this client; starting empty"
            );
            ImageCacheState::default()
        }
    }
}

/// Parses a raw persisted blob. Unreadable JSON is treated as "nothing
/// stored".
pub fn decode_state(raw: &str) -> ImageCacheState {
    match serde_json::from_str::<Value>(raw) {
        Ok(payload) => migrate(payload),
        Err(err) => {
            tracing::warn!(error = %err, "persisted image cache is not valid JSON; starting empty");
            ImageCacheState::default()
        }
    }
}

fn lenient_images(value: Option<&Value>) -> Vec<GeneratedImage> {
    let Some(rows) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| serde_json::from_value::<GeneratedImage>(row.clone()).ok())
        .collect()
}
