//! Editor - the collage being arranged, plus its selection.

use image::RgbaImage;

use crate::compositor::Canvas;
use crate::scene::{ImageHandle, LayerId, Scene};
use crate::transform::{GestureOutcome, Selection, TransformController, TransformGesture};

/// Scene, selection and the canvas they are rendered onto.
#[derive(Debug, Default)]
pub struct Editor {
    scene: Scene,
    controller: TransformController,
    canvas: Canvas,
}

impl Editor {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            scene: Scene::new(),
            controller: TransformController::new(),
            canvas,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn selection(&self) -> Selection {
        self.controller.selection()
    }

    pub fn set_background(&mut self, image: ImageHandle) {
        self.scene.set_background(image);
    }

    pub fn add_layer(&mut self, image: ImageHandle) -> LayerId {
        self.scene.add_layer(image)
    }

    /// Remove a layer, dropping the selection if it pointed at it.
    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        if self.controller.selection().is_selected(id) {
            self.controller.select(None);
        }
        self.scene.remove_layer(id).is_some()
    }

    pub fn select(&mut self, id: Option<LayerId>) {
        self.controller.select(id);
    }

    pub fn drag_end(&mut self, id: LayerId, x: f32, y: f32) -> GestureOutcome {
        self.controller.drag_end(&mut self.scene, id, x, y)
    }

    pub fn transform_end(&mut self, id: LayerId, gesture: TransformGesture) -> GestureOutcome {
        self.controller.transform_end(&mut self.scene, id, gesture)
    }

    /// What the user sees: the composite with the selection handle on top.
    pub fn preview(&self) -> RgbaImage {
        self.canvas
            .render_preview(&self.scene, self.controller.handle_box(&self.scene))
    }

    /// Flatten the collage to PNG. Never includes the selection handle, and
    /// leaves the selection as it was.
    pub fn export_png(&self) -> Result<Vec<u8>, image::ImageError> {
        self.canvas.render_png(&self.scene)
    }

    /// Start over with an empty scene.
    pub fn clear(&mut self) {
        self.controller.select(None);
        self.scene.clear();
    }
}
