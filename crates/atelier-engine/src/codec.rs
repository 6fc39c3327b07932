use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD as BASE64};
use base64::engine::DecodePaddingMode;
use base64::{DecodeError, Engine as _};

/// Decoding is done this many characters at a time. Must stay a multiple of
/// four so no chunk boundary splits a quantum.
const DECODE_CHUNK_CHARS: usize = 1024;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Returns the payload part of a `data:<mime>;base64,<payload>` URI, or the
/// input unchanged when it is bare base64.
pub fn strip_data_uri(raw: &str) -> &str {
    match raw.split_once("base64,") {
        Some((_, payload)) => payload,
        None => raw,
    }
}

/// Decodes bare base64 or a base64 data URI. Whitespace is ignored and
/// padding is optional.
pub fn decode_base64(raw: &str) -> Result<Vec<u8>, DecodeError> {
    let cleaned: Vec<u8> = strip_data_uri(raw)
        .bytes()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    let mut out = Vec::with_capacity(cleaned.len() / 4 * 3 + 3);
    for chunk in cleaned.chunks(DECODE_CHUNK_CHARS) {
        LENIENT.decode_vec(chunk, &mut out)?;
    }
    Ok(out)
}

pub fn to_data_uri(mime: &str, base64_payload: &str) -> String {
    format!("data:{mime};base64,{base64_payload}")
}

pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}
