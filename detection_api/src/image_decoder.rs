use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload has no `,` separating header and data")]
    MissingSeparator,
    #[error("image payload has no data after the header")]
    EmptyPayload,
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("unsupported or corrupt image: {0}")]
    UnsupportedImage(#[from] image::ImageError),
}

/// Decodes a `<header>,<base64data>` payload into an RGB pixel buffer.
///
/// The header is discarded; the format is guessed from the decoded bytes.
/// Grayscale and alpha images are converted to three channels.
pub fn decode_data_url(payload: &str) -> Result<RgbImage, DecodeError> {
    let (_header, data) = payload
        .split_once(',')
        .ok_or(DecodeError::MissingSeparator)?;

    // Line-wrapped payloads are common; whitespace is never part of the alphabet.
    let data: String = data.split_ascii_whitespace().collect();
    if data.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }

    let bytes = STANDARD.decode(&data)?;
    let image = image::load_from_memory(&bytes)?;

    Ok(image.to_rgb8())
}

/// `[height, width, channels]` of a decoded buffer.
pub fn image_shape(image: &RgbImage) -> [u32; 3] {
    [image.height(), image.width(), 3]
}
