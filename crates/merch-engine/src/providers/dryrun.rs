use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::{GenerateRequest, GeneratedImage, ImageProvider, ProviderError};

/// Offline provider: a solid PNG whose colour is derived from the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, ProviderError> {
        let spec = request.aspect.spec();
        // Scaled down; only the proportions matter offline.
        let (width, height) = (spec.width / 8, spec.height / 8);
        let (r, g, b) = color_from_prompt(&request.prompt);
        let mut image = RgbImage::new(width, height);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|err| ProviderError::Decode {
                provider: "Dryrun",
                message: format!("failed to encode placeholder ({err})"),
            })?;
        Ok(GeneratedImage {
            bytes: bytes.into_inner(),
            mime_type: "image/png".to_string(),
        })
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
