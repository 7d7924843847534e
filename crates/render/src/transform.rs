use glam::{Mat3, Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use tilegrid_common::{BufferAllocator, BufferHandle, BufferKind, RenderError};

use crate::stage::row_mul;

/// Size of the Transforms uniform: one column-major `mat4x4<f32>`.
pub const TRANSFORMS_SIZE: u64 = 64;

/// The world-to-screen matrix for one render target.
///
/// Stored in the shaders' convention: positions are row vectors multiplied on
/// the left, `screen = position * world_to_screen`. A camera given as the
/// usual column-vector `projection * view` is therefore stored transposed.
#[derive(Debug, Clone)]
pub struct TransformState {
    world_to_screen: Mat4,
    handle: Option<BufferHandle>,
    dirty: bool,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            world_to_screen: Mat4::IDENTITY,
            handle: None,
            dirty: true,
        }
    }
}

impl TransformState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose `projection * view` and store it in row-vector form.
    pub fn set_camera(&mut self, view: Mat4, projection: Mat4) {
        self.set_world_to_screen((projection * view).transpose());
    }

    /// Set the matrix directly, already in row-vector form.
    pub fn set_world_to_screen(&mut self, world_to_screen: Mat4) {
        if world_to_screen != self.world_to_screen {
            self.world_to_screen = world_to_screen;
            self.dirty = true;
        }
    }

    pub fn world_to_screen(&self) -> Mat4 {
        self.world_to_screen
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn handle(&self) -> Option<BufferHandle> {
        self.handle
    }

    /// Clip-space position of a world point on the z = 0 plane.
    pub fn apply(&self, world: Vec2) -> Vec4 {
        row_mul(world.extend(0.0).extend(1.0), &self.world_to_screen)
    }

    /// Normalized device coordinates of a world point.
    pub fn project(&self, world: Vec2) -> Vec2 {
        let clip = self.apply(world);
        clip.xy() / clip.w
    }

    /// World point on the z = 0 plane that projects to `ndc`.
    ///
    /// Returns `None` when the transform collapses the plane.
    pub fn screen_to_world(&self, ndc: Vec2) -> Option<Vec2> {
        let m = self.world_to_screen.transpose();
        let xyw = |c: Vec4| Vec3::new(c.x, c.y, c.w);
        let plane = Mat3::from_cols(xyw(m.x_axis), xyw(m.y_axis), xyw(m.w_axis));
        let det = plane.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let q = plane.inverse() * ndc.extend(1.0);
        let world = q.truncate() / q.z;
        world.is_finite().then_some(world)
    }

    /// Uniform bytes: 16 floats, column-major.
    pub fn to_bytes(&self) -> [u8; TRANSFORMS_SIZE as usize] {
        bytemuck::cast(self.world_to_screen.to_cols_array())
    }

    /// Write the matrix to its uniform buffer, allocating it on first use.
    pub fn upload<A: BufferAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
    ) -> Result<BufferHandle, RenderError> {
        let handle = match self.handle {
            Some(handle) => handle,
            None => {
                let handle = alloc.allocate(BufferKind::Uniform, "transforms", TRANSFORMS_SIZE)?;
                self.handle = Some(handle);
                self.dirty = true;
                handle
            }
        };
        if self.dirty {
            alloc.write(handle, 0, &self.to_bytes())?;
            self.dirty = false;
            tracing::trace!("transforms uploaded");
        }
        Ok(handle)
    }
}
