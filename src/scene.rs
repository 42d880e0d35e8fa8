//! Scene model: the background image and the ordered stack of layers above it.
//!
//! The scene is pure data. Everything the compositor needs to flatten the
//! collage lives here; selection state is kept elsewhere.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;

/// Default placement of a freshly added layer, in canvas units.
pub const DEFAULT_LAYER_X: f32 = 50.0;
pub const DEFAULT_LAYER_Y: f32 = 50.0;

/// A decoded raster image shared between the scene and any layers using it.
///
/// Cloning is cheap: the pixel buffer sits behind an `Arc`.
#[derive(Clone)]
pub struct ImageHandle {
    pixels: Arc<RgbaImage>,
}

impl ImageHandle {
    /// Wrap an already decoded RGBA buffer.
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    /// Decode an encoded image (PNG, JPEG) from memory.
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::new(decoded.to_rgba8()))
    }

    /// Decode an image file from disk.
    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        let decoded = image::open(path)?;
        Ok(Self::new(decoded.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Borrow the underlying pixel buffer.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// True when both handles point at the same decoded buffer.
    pub fn ptr_eq(&self, other: &ImageHandle) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Stable identity of a layer for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A positioned, rotated and uniformly scaled image above the background.
#[derive(Debug, Clone)]
pub struct Layer {
    pub id: LayerId,
    pub image: ImageHandle,
    pub x: f32,
    pub y: f32,
    /// Rotation in degrees, clockwise, about the layer origin.
    pub rotation: f32,
    pub scale: f32,
}

impl Layer {
    /// Size of the layer on the canvas after scaling.
    pub fn scaled_size(&self) -> (f32, f32) {
        (
            self.image.width() as f32 * self.scale,
            self.image.height() as f32 * self.scale,
        )
    }
}

/// Partial update applied to a layer. Unset fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerUpdate {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub rotation: Option<f32>,
    pub scale: Option<f32>,
}

impl LayerUpdate {
    pub fn position(x: f32, y: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    fn apply(&self, layer: &mut Layer) {
        if let Some(x) = self.x {
            layer.x = x;
        }
        if let Some(y) = self.y {
            layer.y = y;
        }
        if let Some(rotation) = self.rotation {
            layer.rotation = rotation;
        }
        if let Some(scale) = self.scale {
            layer.scale = scale;
        }
    }
}

/// Background plus layers in paint order.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    background: Option<ImageHandle>,
    layers: Vec<Layer>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the background unconditionally.
    pub fn set_background(&mut self, image: ImageHandle) {
        log::debug!(
            "Background set ({}x{})",
            image.width(),
            image.height()
        );
        self.background = Some(image);
    }

    pub fn background(&self) -> Option<&ImageHandle> {
        self.background.as_ref()
    }

    /// Append a layer at the default placement and return its new id.
    pub fn add_layer(&mut self, image: ImageHandle) -> LayerId {
        self.next_id += 1;
        let id = LayerId(self.next_id);
        self.layers.push(Layer {
            id,
            image,
            x: DEFAULT_LAYER_X,
            y: DEFAULT_LAYER_Y,
            rotation: 0.0,
            scale: 1.0,
        });
        log::debug!("Added layer {} ({} layers total)", id, self.layers.len());
        id
    }

    /// Apply a partial update to the layer with `id`.
    ///
    /// Unknown ids are ignored. Returns whether a layer was updated.
    pub fn update_layer(&mut self, id: LayerId, update: LayerUpdate) -> bool {
        match self.layers.iter_mut().find(|layer| layer.id == id) {
            Some(layer) => {
                update.apply(layer);
                true
            }
            None => {
                log::debug!("Ignoring update for unknown layer {}", id);
                false
            }
        }
    }

    /// Remove a layer, keeping the order of the rest. Returns the removed layer.
    pub fn remove_layer(&mut self, id: LayerId) -> Option<Layer> {
        let index = self.layers.iter().position(|layer| layer.id == id)?;
        Some(self.layers.remove(index))
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    /// Layers in paint order (first is painted first).
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.background.is_none() && self.layers.is_empty()
    }

    /// Drop the background and every layer.
    pub fn clear(&mut self) {
        self.background = None;
        self.layers.clear();
    }
}
