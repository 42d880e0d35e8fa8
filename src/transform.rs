//! Selection and transform gestures.
//!
//! Gestures report their end state (position after a drag, scale and
//! rotation after a resize/rotate). The controller turns them into scene
//! updates and enforces the minimum handle size.

use crate::scene::{Layer, LayerId, LayerUpdate, Scene};

/// Smallest width or height the transform handle may shrink to.
pub const MIN_HANDLE_SIZE: f32 = 20.0;

/// The single selected layer, if any. Never part of the rendered output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    selected: Option<LayerId>,
}

impl Selection {
    pub fn selected(&self) -> Option<LayerId> {
        self.selected
    }

    pub fn is_selected(&self, id: LayerId) -> bool {
        self.selected == Some(id)
    }
}

/// Box drawn around the selected layer, in canvas units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Degrees, about (x, y).
    pub rotation: f32,
}

impl BoundingBox {
    pub fn of_layer(layer: &Layer) -> Self {
        let (width, height) = layer.scaled_size();
        Self {
            x: layer.x,
            y: layer.y,
            width,
            height,
            rotation: layer.rotation,
        }
    }

    pub fn is_too_small(&self) -> bool {
        self.width.abs() < MIN_HANDLE_SIZE || self.height.abs() < MIN_HANDLE_SIZE
    }
}

/// Accept `proposed` unless it would shrink below the handle floor, in which
/// case `previous` is kept.
pub fn constrain_box(previous: BoundingBox, proposed: BoundingBox) -> BoundingBox {
    if proposed.is_too_small() {
        previous
    } else {
        proposed
    }
}

/// End state of a resize/rotate gesture as reported by the handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformGesture {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

/// What happened to a gesture once it reached the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Applied,
    /// The gesture would have shrunk the layer below the handle floor.
    Rejected,
    UnknownLayer,
}

/// Mediates selection and gestures into scene mutations.
#[derive(Debug, Default)]
pub struct TransformController {
    selection: Selection,
}

impl TransformController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Select one layer, or clear the selection with `None`.
    pub fn select(&mut self, id: Option<LayerId>) {
        self.selection.selected = id;
    }

    /// Box for the selection handle, if the selected layer still exists.
    pub fn handle_box(&self, scene: &Scene) -> Option<BoundingBox> {
        let id = self.selection.selected?;
        scene.layer(id).map(BoundingBox::of_layer)
    }

    /// Commit the final position of a drag.
    pub fn drag_end(&mut self, scene: &mut Scene, id: LayerId, x: f32, y: f32) -> GestureOutcome {
        if scene.update_layer(id, LayerUpdate::position(x, y)) {
            GestureOutcome::Applied
        } else {
            GestureOutcome::UnknownLayer
        }
    }

    /// Commit the final state of a resize/rotate gesture.
    ///
    /// Scaling is uniform: the horizontal factor is applied to both axes.
    pub fn transform_end(
        &mut self,
        scene: &mut Scene,
        id: LayerId,
        gesture: TransformGesture,
    ) -> GestureOutcome {
        let Some(layer) = scene.layer(id) else {
            return GestureOutcome::UnknownLayer;
        };

        let scale = gesture.scale_x;
        let previous = BoundingBox::of_layer(layer);
        let proposed = BoundingBox {
            x: gesture.x,
            y: gesture.y,
            width: layer.image.width() as f32 * scale,
            height: layer.image.height() as f32 * scale,
            rotation: gesture.rotation,
        };

        if constrain_box(previous, proposed) != proposed {
            log::debug!(
                "Rejected transform of layer {}: {:.1}x{:.1} is below {}",
                id,
                proposed.width,
                proposed.height,
                MIN_HANDLE_SIZE
            );
            return GestureOutcome::Rejected;
        }

        scene.update_layer(
            id,
            LayerUpdate {
                x: Some(gesture.x),
                y: Some(gesture.y),
                rotation: Some(gesture.rotation),
                scale: Some(scale),
            },
        );
        GestureOutcome::Applied
    }
}
