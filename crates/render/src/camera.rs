use glam::{Mat4, UVec2, Vec2, Vec3};

use crate::TransformState;

/// Orthographic 2D camera with drag-to-pan.
///
/// World +y points down the screen. `aspect` is height / width so a world unit
/// stays square on any viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthoCamera {
    /// World point at the centre of the screen.
    pub center: Vec2,
    /// NDC units per world unit, vertically.
    pub scale: f32,
    pub aspect: f32,
}

impl Default for OrthoCamera {
    fn default() -> Self {
        Self {
            center: Vec2::ZERO,
            scale: 0.1,
            aspect: 1.0,
        }
    }
}

impl OrthoCamera {
    /// Camera centred on a `width x height` grid, zoomed to fit it.
    pub fn framing(width: u32, height: u32) -> Self {
        let extent = width.max(height).max(1) as f32;
        Self {
            center: Vec2::new(width as f32, height as f32) * 0.5,
            scale: 2.0 / extent,
            aspect: 1.0,
        }
    }

    pub fn set_viewport(&mut self, viewport: UVec2) {
        let v = viewport.max(UVec2::ONE).as_vec2();
        self.aspect = v.y / v.x;
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_translation(-self.center.extend(0.0))
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::from_scale(Vec3::new(self.scale * self.aspect, -self.scale, 1.0))
    }

    /// World units covered by one NDC unit on each axis.
    fn ndc_to_world_scale(&self) -> Vec2 {
        Vec2::new(1.0 / (self.scale * self.aspect), -1.0 / self.scale)
    }

    /// Move the camera so the world follows a cursor drag of `delta` pixels.
    pub fn pan_pixels(&mut self, delta: Vec2, viewport: UVec2) {
        let v = viewport.max(UVec2::ONE).as_vec2();
        let ndc = Vec2::new(delta.x, -delta.y) * 2.0 / v;
        self.center -= ndc * self.ndc_to_world_scale();
    }

    /// Multiply the zoom, keeping the centre fixed. Non-positive factors are ignored.
    pub fn zoom(&mut self, factor: f32) {
        if factor > 0.0 && factor.is_finite() {
            self.scale *= factor;
        }
    }

    pub fn apply_to(&self, transforms: &mut TransformState) {
        transforms.set_camera(self.view(), self.projection());
    }
}

/// Convert a pixel position (origin top-left, y down) to NDC (y up).
pub fn viewport_to_ndc(pixel: Vec2, viewport: UVec2) -> Vec2 {
    let v = viewport.max(UVec2::ONE).as_vec2();
    Vec2::new(pixel.x / v.x * 2.0 - 1.0, 1.0 - pixel.y / v.y * 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transforms(camera: &OrthoCamera) -> TransformState {
        let mut state = TransformState::new();
        camera.apply_to(&mut state);
        state
    }

    #[test]
    fn default_camera() {
        let cam = OrthoCamera::default();
        let state = transforms(&cam);
        assert!(!state.world_to_screen().x_axis.x.is_nan());
        assert_eq!(state.project(Vec2::ZERO), Vec2::ZERO);
    }

    #[test]
    fn world_y_points_down_the_screen() {
        let state = transforms(&OrthoCamera::default());
        assert!(state.project(Vec2::new(0.0, 1.0)).y < 0.0);
    }

    #[test]
    fn viewport_centre_picks_camera_centre() {
        let mut cam = OrthoCamera::framing(16, 16);
        let viewport = UVec2::new(800, 600);
        cam.set_viewport(viewport);
        let state = transforms(&cam);
        let ndc = viewport_to_ndc(Vec2::new(400.0, 300.0), viewport);
        let world = state.screen_to_world(ndc).unwrap();
        assert!((world - cam.center).length() < 1e-4);
    }

    #[test]
    fn drag_keeps_point_under_cursor() {
        let viewport = UVec2::new(640, 480);
        let mut cam = OrthoCamera::default();
        cam.set_viewport(viewport);
        let start_px = Vec2::new(100.0, 120.0);
        let grabbed = transforms(&cam)
            .screen_to_world(viewport_to_ndc(start_px, viewport))
            .unwrap();

        let delta = Vec2::new(35.0, -20.0);
        cam.pan_pixels(delta, viewport);
        let under_cursor = transforms(&cam)
            .screen_to_world(viewport_to_ndc(start_px + delta, viewport))
            .unwrap();
        assert!((under_cursor - grabbed).length() < 1e-3);
    }

    #[test]
    fn picking_survives_far_zoom_out() {
        let viewport = UVec2::new(1920, 1080);
        let mut cam = OrthoCamera::framing(4096, 4096);
        cam.set_viewport(viewport);
        cam.zoom(0.25);
        let state = transforms(&cam);
        for p in [Vec2::new(100.0, 100.0), Vec2::new(4000.0, 12.0), cam.center] {
            let back = state.screen_to_world(state.project(p)).unwrap();
            assert!((back - p).length() < 0.05, "{p} -> {back}");
        }
    }

    #[test]
    fn zoom_ignores_bad_factors() {
        let mut cam = OrthoCamera::default();
        cam.zoom(2.0);
        assert!((cam.scale - 0.2).abs() < 1e-6);
        cam.zoom(0.0);
        cam.zoom(f32::NAN);
        assert!((cam.scale - 0.2).abs() < 1e-6);
    }
}
