//! Image acquisition: bring an image into the editor from a file or from a
//! text prompt, as the background or as a new layer.

use std::path::PathBuf;

use crate::editor::Editor;
use crate::scene::{ImageHandle, LayerId};
use crate::service::{validate_prompt, GenerationService, ImageCache, ServiceError};

/// Where an acquired image goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageTarget {
    #[default]
    Background,
    Layer,
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Prompt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode an image from `source`. Prompts go through the generation service,
/// consulting `cache` first when given.
pub async fn acquire<S: GenerationService>(
    service: &S,
    cache: Option<&ImageCache>,
    source: &ImageSource,
) -> Result<ImageHandle, AcquireError> {
    match source {
        ImageSource::File(path) => {
            log::debug!("Loading image from {}", path.display());
            Ok(ImageHandle::open(path)?)
        }
        ImageSource::Prompt(prompt) => {
            let prompt = prompt.trim();
            validate_prompt(prompt)?;

            if let Some(path) = cache.and_then(|c| c.get(prompt)) {
                log::info!("Using cached image for prompt: {}", prompt);
                let bytes = std::fs::read(&path)?;
                return Ok(ImageHandle::decode(&bytes)?);
            }

            let generated = service.generate_image(prompt).await?;
            let bytes = generated.to_bytes()?;
            let handle = ImageHandle::decode(&bytes)?;
            if let Some(cache) = cache {
                if let Err(e) = cache.store(prompt, &bytes) {
                    log::warn!("Could not cache generated image: {}", e);
                }
            }
            Ok(handle)
        }
    }
}

/// Put an acquired image into the editor. Returns the layer id for layers.
pub fn place(editor: &mut Editor, target: ImageTarget, image: ImageHandle) -> Option<LayerId> {
    match target {
        ImageTarget::Background => {
            editor.set_background(image);
            None
        }
        ImageTarget::Layer => Some(editor.add_layer(image)),
    }
}
