//! Compositor - flattens a scene into a single raster image.
//!
//! `render` only ever sees the [`Scene`], so selection decoration cannot end
//! up in an exported composite. The editor preview draws the handle in a
//! separate pass on top of a rendered copy.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Pixel, Rgba, RgbaImage};

use crate::scene::{Layer, Scene};
use crate::transform::BoundingBox;

/// Default canvas width in pixels.
pub const DEFAULT_CANVAS_WIDTH: u32 = 800;

/// Default canvas height in pixels.
pub const DEFAULT_CANVAS_HEIGHT: u32 = 600;

/// Color of the selection handle outline in previews.
const HANDLE_COLOR: Rgba<u8> = Rgba([0, 161, 255, 255]);

/// Fixed output surface the scene is flattened onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
        }
    }
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Flatten `scene`: background stretched to the canvas, then each layer
    /// in insertion order.
    pub fn render(&self, scene: &Scene) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);

        if let Some(background) = scene.background() {
            let stretched = imageops::resize(
                background.pixels(),
                self.width,
                self.height,
                FilterType::Triangle,
            );
            imageops::replace(&mut out, &stretched, 0, 0);
        }

        for layer in scene.layers() {
            paint_layer(&mut out, layer);
        }

        out
    }

    /// Render and encode as PNG.
    pub fn render_png(&self, scene: &Scene) -> Result<Vec<u8>, image::ImageError> {
        encode_png(&self.render(scene))
    }

    /// Render with the selection handle drawn on top. For on-screen use only.
    pub fn render_preview(&self, scene: &Scene, handle: Option<BoundingBox>) -> RgbaImage {
        let mut out = self.render(scene);
        if let Some(bbox) = handle {
            draw_handle(&mut out, bbox);
        }
        out
    }
}

/// Encode an RGBA buffer as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Inline-displayable `data:` URL for PNG bytes.
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", BASE64_STANDARD.encode(png))
}

/// Maps layer-local coordinates onto the canvas: scale, rotate about the
/// layer origin, then translate to (x, y).
#[derive(Debug, Clone, Copy)]
struct LayerTransform {
    tx: f32,
    ty: f32,
    cos: f32,
    sin: f32,
    scale: f32,
}

impl LayerTransform {
    fn new(x: f32, y: f32, rotation_degrees: f32, scale: f32) -> Self {
        let radians = rotation_degrees.to_radians();
        Self {
            tx: x,
            ty: y,
            cos: radians.cos(),
            sin: radians.sin(),
            scale,
        }
    }

    fn forward(&self, u: f32, v: f32) -> (f32, f32) {
        let (su, sv) = (u * self.scale, v * self.scale);
        (
            self.tx + su * self.cos - sv * self.sin,
            self.ty + su * self.sin + sv * self.cos,
        )
    }

    fn inverse(&self, px: f32, py: f32) -> (f32, f32) {
        let (dx, dy) = (px - self.tx, py - self.ty);
        (
            (dx * self.cos + dy * self.sin) / self.scale,
            (-dx * self.sin + dy * self.cos) / self.scale,
        )
    }

    /// Axis-aligned canvas bounds of a `w` x `h` local rectangle.
    fn bounds(&self, w: f32, h: f32) -> (f32, f32, f32, f32) {
        let corners = [
            self.forward(0.0, 0.0),
            self.forward(w, 0.0),
            self.forward(0.0, h),
            self.forward(w, h),
        ];
        corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

fn paint_layer(out: &mut RgbaImage, layer: &Layer) {
    if layer.scale == 0.0 || !layer.scale.is_finite() {
        return;
    }

    let src = layer.image.pixels();
    let (src_w, src_h) = (src.width() as f32, src.height() as f32);
    let transform = LayerTransform::new(layer.x, layer.y, layer.rotation, layer.scale);

    let (min_x, min_y, max_x, max_y) = transform.bounds(src_w, src_h);
    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(out.width());
    let y1 = (max_y.ceil().max(0.0) as u32).min(out.height());

    for py in y0..y1 {
        for px in x0..x1 {
            // sample at the pixel centre
            let (u, v) = transform.inverse(px as f32 + 0.5, py as f32 + 0.5);
            if u < 0.0 || v < 0.0 || u >= src_w || v >= src_h {
                continue;
            }
            let texel = *src.get_pixel(u as u32, v as u32);
            if texel[3] == 0 {
                continue;
            }
            out.get_pixel_mut(px, py).blend(&texel);
        }
    }
}

fn draw_handle(out: &mut RgbaImage, bbox: BoundingBox) {
    let transform = LayerTransform::new(bbox.x, bbox.y, bbox.rotation, 1.0);
    let corners = [
        transform.forward(0.0, 0.0),
        transform.forward(bbox.width, 0.0),
        transform.forward(bbox.width, bbox.height),
        transform.forward(0.0, bbox.height),
    ];
    for i in 0..corners.len() {
        draw_line(out, corners[i], corners[(i + 1) % corners.len()]);
    }
}

fn draw_line(out: &mut RgbaImage, from: (f32, f32), to: (f32, f32)) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as u32;
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let x = from.0 + (to.0 - from.0) * t;
        let y = from.1 + (to.1 - from.1) * t;
        if x >= 0.0 && y >= 0.0 && (x as u32) < out.width() && (y as u32) < out.height() {
            out.put_pixel(x as u32, y as u32, HANDLE_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ImageHandle, LayerUpdate};

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn solid(w: u32, h: u32, color: Rgba<u8>) -> ImageHandle {
        ImageHandle::new(RgbaImage::from_pixel(w, h, color))
    }

    #[test]
    fn test_empty_scene_renders_transparent_canvas() {
        let canvas = Canvas::new(16, 8);
        let out = canvas.render(&Scene::new());
        assert_eq!(out.dimensions(), (16, 8));
        assert!(out.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_background_is_stretched_to_canvas() {
        let canvas = Canvas::default();
        let mut scene = Scene::new();
        scene.set_background(solid(10, 10, BLUE));
        let out = canvas.render(&scene);
        assert_eq!(out.dimensions(), (DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT));
        assert_eq!(*out.get_pixel(0, 0), BLUE);
        assert_eq!(*out.get_pixel(799, 599), BLUE);
    }

    #[test]
    fn test_layer_painted_at_its_position() {
        let canvas = Canvas::new(200, 200);
        let mut scene = Scene::new();
        scene.set_background(solid(1, 1, BLUE));
        scene.add_layer(solid(20, 10, RED));
        let out = canvas.render(&scene);

        // default placement is (50, 50)
        assert_eq!(*out.get_pixel(50, 50), RED);
        assert_eq!(*out.get_pixel(69, 59), RED);
        assert_eq!(*out.get_pixel(70, 50), BLUE);
        assert_eq!(*out.get_pixel(49, 50), BLUE);
        assert_eq!(*out.get_pixel(50, 60), BLUE);
    }

    #[test]
    fn test_later_layers_paint_over_earlier() {
        let canvas = Canvas::new(200, 200);
        let mut scene = Scene::new();
        scene.add_layer(solid(20, 20, RED));
        scene.add_layer(solid(20, 20, GREEN));
        let out = canvas.render(&scene);
        assert_eq!(*out.get_pixel(55, 55), GREEN);
    }

    #[test]
    fn test_scale_pivots_at_layer_origin() {
        let canvas = Canvas::new(200, 200);
        let mut scene = Scene::new();
        let id = scene.add_layer(solid(10, 10, RED));
        scene.update_layer(
            id,
            LayerUpdate {
                x: Some(10.0),
                y: Some(10.0),
                scale: Some(3.0),
                ..LayerUpdate::default()
            },
        );
        let out = canvas.render(&scene);
        assert_eq!(*out.get_pixel(10, 10), RED);
        assert_eq!(*out.get_pixel(39, 39), RED);
        assert_eq!(out.get_pixel(40, 40)[3], 0);
        assert_eq!(out.get_pixel(9, 9)[3], 0);
    }

    #[test]
    fn test_rotation_pivots_at_layer_origin() {
        let canvas = Canvas::new(200, 200);
        let mut scene = Scene::new();
        let id = scene.add_layer(solid(40, 10, RED));
        scene.update_layer(
            id,
            LayerUpdate {
                x: Some(100.0),
                y: Some(100.0),
                rotation: Some(90.0),
                ..LayerUpdate::default()
            },
        );
        let out = canvas.render(&scene);
        // 90 degrees clockwise: the long edge now runs downwards, to the left of x
        assert_eq!(*out.get_pixel(95, 130), RED);
        assert_eq!(out.get_pixel(120, 102)[3], 0);
    }

    #[test]
    fn test_zero_scale_layer_is_invisible() {
        let canvas = Canvas::new(100, 100);
        let mut scene = Scene::new();
        let id = scene.add_layer(solid(10, 10, RED));
        scene.update_layer(
            id,
            LayerUpdate {
                scale: Some(0.0),
                ..LayerUpdate::default()
            },
        );
        let out = canvas.render(&scene);
        assert!(out.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_render_is_deterministic() {
        let canvas = Canvas::new(120, 90);
        let mut scene = Scene::new();
        scene.set_background(solid(3, 3, BLUE));
        let id = scene.add_layer(solid(30, 12, RED));
        scene.update_layer(
            id,
            LayerUpdate {
                rotation: Some(33.0),
                scale: Some(1.7),
                ..LayerUpdate::default()
            },
        );
        assert_eq!(canvas.render(&scene), canvas.render(&scene));
    }

    #[test]
    fn test_preview_draws_handle_but_render_does_not() {
        let canvas = Canvas::new(200, 200);
        let mut scene = Scene::new();
        scene.set_background(solid(1, 1, BLUE));
        let id = scene.add_layer(solid(40, 40, RED));
        let bbox = BoundingBox::of_layer(scene.layer(id).unwrap());

        let plain = canvas.render(&scene);
        let preview = canvas.render_preview(&scene, Some(bbox));
        assert_ne!(plain, preview);
        assert_eq!(*preview.get_pixel(60, 50), HANDLE_COLOR);
        assert_eq!(canvas.render_preview(&scene, None), plain);
    }

    #[test]
    fn test_render_png_round_trips_through_decoder() {
        let canvas = Canvas::new(32, 24);
        let mut scene = Scene::new();
        scene.set_background(solid(2, 2, GREEN));
        let png = canvas.render_png(&scene).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let decoded = ImageHandle::decode(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
        assert_eq!(*decoded.pixels().get_pixel(5, 5), GREEN);
    }

    #[test]
    fn test_png_data_url_prefix() {
        assert_eq!(png_data_url(&[0, 0, 0]), "data:image/png;base64,AAAA");
    }
}
