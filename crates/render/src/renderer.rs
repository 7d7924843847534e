use std::fmt;

use glam::{Mat4, Vec2, Vec4, Vec4Swizzles};
use tilegrid_common::{
    BufferAllocator, BufferHandle, BufferKind, HostAllocator, RenderError, TextureHandle, Tile,
    TilemapMeta, Vertex, unit_quad,
};

use crate::stage::{self, Sampler, VertexOut};
use crate::tile_buffer::{TILE_STRIDE, TILEMAP_HEADER_SIZE, TilemapHeader, check_tile_extent};
use crate::transform::TRANSFORMS_SIZE;
use crate::{DrawCommand, FramePlan};

/// Backend interface. All renderers implement this trait.
///
/// A renderer executes a validated `FramePlan`. Either the whole plan is
/// executed or an error is returned and nothing is drawn.
pub trait Renderer {
    /// The output type produced by this renderer.
    type Output;

    /// Execute one frame.
    fn render(&mut self, plan: &FramePlan) -> Result<Self::Output, RenderError>;
}

/// RGBA8 texture held in host memory, sampled nearest with clamp-to-edge.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTexture {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl HostTexture {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, RenderError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(RenderError::InvalidConfig(format!(
                "texture {width}x{height} needs {expected} RGBA bytes, got {}",
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// Build a texture from a per-texel function.
    pub fn from_fn(
        width: u32,
        height: u32,
        texel: impl Fn(u32, u32) -> [u8; 4],
    ) -> Result<Self, RenderError> {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                rgba.extend_from_slice(&texel(x, y));
            }
        }
        Self::new(width, height, rgba)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

impl Sampler for HostTexture {
    fn sample(&self, uv: Vec2) -> Vec4 {
        let x = ((uv.x * self.width as f32).floor() as i64).clamp(0, self.width as i64 - 1);
        let y = ((uv.y * self.height as f32).floor() as i64).clamp(0, self.height as i64 - 1);
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let t = &self.rgba[i..i + 4];
        Vec4::new(t[0] as f32, t[1] as f32, t[2] as f32, t[3] as f32) / 255.0
    }
}

/// Which draw produced a quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadKind {
    Tile { instance: u32, tile: Tile },
    Sprite { index: usize },
}

/// One rasterized quad as the CPU renderer saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadReport {
    pub kind: QuadKind,
    pub sheet: TextureHandle,
    /// NDC bounding box of the four corners.
    pub screen_min: Vec2,
    pub screen_max: Vec2,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
    /// Fragment output at the quad centre.
    pub center_color: Vec4,
}

/// Result of a CPU-rendered frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub draw_calls: usize,
    pub quads: Vec<QuadReport>,
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== Frame (draw_calls={}, quads={}) ===",
            self.draw_calls,
            self.quads.len()
        )?;
        for q in &self.quads {
            match q.kind {
                QuadKind::Tile { instance, tile } => write!(
                    f,
                    "  tile   #{instance:<4} sheet_pos={:<4} grid_pos={:<5}",
                    tile.sheet_pos, tile.grid_pos
                )?,
                QuadKind::Sprite { index } => write!(f, "  sprite #{index:<4}{:28}", "")?,
            }
            writeln!(
                f,
                " screen=({:.3}, {:.3})..({:.3}, {:.3}) uv=({:.3}, {:.3})..({:.3}, {:.3}) rgba=({:.2}, {:.2}, {:.2}, {:.2})",
                q.screen_min.x,
                q.screen_min.y,
                q.screen_max.x,
                q.screen_max.y,
                q.uv_min.x,
                q.uv_min.y,
                q.uv_max.x,
                q.uv_max.y,
                q.center_color.x,
                q.center_color.y,
                q.center_color.z,
                q.center_color.w,
            )?;
        }
        Ok(())
    }
}

/// CPU renderer: decodes the uploaded bytes exactly as the shaders would
/// and runs the reference stages on every quad corner.
///
/// Doubles as the buffer allocator, so the same upload code paths used for
/// the GPU backend feed it.
#[derive(Debug, Clone, Default)]
pub struct DebugRenderer {
    buffers: HostAllocator,
    textures: Vec<HostTexture>,
}

impl DebugRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allocator(buffers: HostAllocator) -> Self {
        Self {
            buffers,
            textures: Vec::new(),
        }
    }

    pub fn add_texture(&mut self, texture: HostTexture) -> TextureHandle {
        self.textures.push(texture);
        TextureHandle(self.textures.len() as u32 - 1)
    }

    pub fn buffers(&self) -> &HostAllocator {
        &self.buffers
    }

    fn texture(&self, handle: TextureHandle) -> Result<&HostTexture, RenderError> {
        self.textures
            .get(handle.0 as usize)
            .ok_or(RenderError::UnknownHandle {
                kind: "texture",
                id: handle.0,
            })
    }

    fn buffer(&self, handle: BufferHandle, kind: BufferKind) -> Result<&[u8], RenderError> {
        match (self.buffers.contents(handle), self.buffers.kind(handle)) {
            (Some(bytes), Some(k)) if k == kind => Ok(bytes),
            _ => Err(RenderError::UnknownHandle {
                kind: "buffer",
                id: handle.0,
            }),
        }
    }

    fn read_transform(&self, handle: BufferHandle) -> Result<Mat4, RenderError> {
        let bytes = self.buffer(handle, BufferKind::Uniform)?;
        if bytes.len() < TRANSFORMS_SIZE as usize {
            return Err(RenderError::OutOfRange {
                requested: TRANSFORMS_SIZE,
                available: bytes.len() as u64,
            });
        }
        let cols: [f32; 16] = bytemuck::pod_read_unaligned(&bytes[..TRANSFORMS_SIZE as usize]);
        Ok(Mat4::from_cols_array(&cols))
    }

    /// Decode the header and the first `instances` tiles of a tilemap buffer.
    ///
    /// Only the buffer's current data counts; tiles dropped by a later, smaller
    /// upload are out of range even though the capacity still holds them.
    fn read_tilemap(
        &self,
        handle: BufferHandle,
        instances: u32,
    ) -> Result<(TilemapMeta, Vec<Tile>), RenderError> {
        let bytes = self.buffer(handle, BufferKind::Storage)?;
        let live = self.buffers.data_len(handle).unwrap_or(0);
        let needed = check_tile_extent(instances, live.min(bytes.len() as u64))? as usize;
        let header: TilemapHeader = bytemuck::pod_read_unaligned(&bytes[..TILEMAP_HEADER_SIZE]);
        let meta = TilemapMeta::new(
            Vec2::from(header.tile_size),
            header.grid_width,
            header.sheet_width,
        )?;
        let tiles = bytes[TILEMAP_HEADER_SIZE..needed]
            .chunks_exact(TILE_STRIDE)
            .map(bytemuck::pod_read_unaligned::<Tile>)
            .collect();
        Ok((meta, tiles))
    }
}

impl BufferAllocator for DebugRenderer {
    fn allocate(
        &mut self,
        kind: BufferKind,
        label: &str,
        size: u64,
    ) -> Result<BufferHandle, RenderError> {
        self.buffers.allocate(kind, label, size)
    }

    fn write(
        &mut self,
        handle: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), RenderError> {
        self.buffers.write(handle, offset, bytes)
    }

    fn capacity(&self, handle: BufferHandle) -> Option<u64> {
        self.buffers.capacity(handle)
    }

    fn data_len(&self, handle: BufferHandle) -> Option<u64> {
        self.buffers.data_len(handle)
    }

    fn set_data_len(&mut self, handle: BufferHandle, len: u64) -> Result<(), RenderError> {
        self.buffers.set_data_len(handle, len)
    }

    fn release(&mut self, handle: BufferHandle) {
        self.buffers.release(handle)
    }
}

fn rasterize(
    kind: QuadKind,
    sheet: TextureHandle,
    texture: &HostTexture,
    mut corner: impl FnMut(&Vertex) -> VertexOut,
) -> QuadReport {
    let outs: Vec<VertexOut> = unit_quad().iter().map(&mut corner).collect();
    let ndc: Vec<Vec2> = outs
        .iter()
        .map(|o| o.clip_position.xy() / o.clip_position.w)
        .collect();
    let min = |v: &[Vec2]| v.iter().copied().reduce(Vec2::min).unwrap_or_default();
    let max = |v: &[Vec2]| v.iter().copied().reduce(Vec2::max).unwrap_or_default();
    let uvs: Vec<Vec2> = outs.iter().map(|o| o.uv).collect();
    let center = VertexOut {
        clip_position: outs.iter().map(|o| o.clip_position).sum::<Vec4>() / 4.0,
        color: outs.iter().map(|o| o.color).sum::<glam::Vec3>() / 4.0,
        uv: uvs.iter().copied().sum::<Vec2>() / 4.0,
    };
    QuadReport {
        kind,
        sheet,
        screen_min: min(&ndc),
        screen_max: max(&ndc),
        uv_min: min(&uvs),
        uv_max: max(&uvs),
        center_color: stage::fragment(texture, &center),
    }
}

impl Renderer for DebugRenderer {
    type Output = FrameReport;

    fn render(&mut self, plan: &FramePlan) -> Result<FrameReport, RenderError> {
        let _span = tracing::info_span!("debug_render", draws = plan.commands.len()).entered();
        let world_to_screen = self.read_transform(plan.transforms)?;

        let mut report = FrameReport::default();
        let mut sprite_index = 0;
        for command in &plan.commands {
            match command {
                DrawCommand::Tilemap {
                    tiles,
                    sheet,
                    instances,
                } => {
                    let texture = self.texture(*sheet)?;
                    let (meta, decoded) = self.read_tilemap(*tiles, *instances)?;
                    for (instance, tile) in decoded.into_iter().enumerate() {
                        report.quads.push(rasterize(
                            QuadKind::Tile {
                                instance: instance as u32,
                                tile,
                            },
                            *sheet,
                            texture,
                            |v| stage::tilemap_vertex(&meta, tile, v, &world_to_screen),
                        ));
                    }
                    report.draw_calls += 1;
                }
                DrawCommand::Sprite { sheet, push } => {
                    let texture = self.texture(*sheet)?;
                    report.quads.push(rasterize(
                        QuadKind::Sprite {
                            index: sprite_index,
                        },
                        *sheet,
                        texture,
                        |v| stage::sprite_vertex(push, v, &world_to_screen),
                    ));
                    sprite_index += 1;
                    report.draw_calls += 1;
                }
            }
            tracing::trace!(?command, "draw executed");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_texture_checks_size() {
        assert!(HostTexture::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            HostTexture::new(2, 2, vec![0; 15]),
            Err(RenderError::InvalidConfig(_))
        ));
        assert!(HostTexture::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn nearest_sampling_clamps_to_edge() {
        let tex = HostTexture::from_fn(2, 1, |x, _| [x as u8 * 255, 0, 0, 255]).unwrap();
        assert_eq!(tex.sample(Vec2::new(0.25, 0.5)).x, 0.0);
        assert_eq!(tex.sample(Vec2::new(0.75, 0.5)).x, 1.0);
        assert_eq!(tex.sample(Vec2::new(-3.0, 9.0)).x, 0.0);
        assert_eq!(tex.sample(Vec2::new(7.0, 0.0)).x, 1.0);
    }

    #[test]
    fn unknown_handles_fail_before_drawing() {
        let mut renderer = DebugRenderer::new();
        let plan = FramePlan {
            transforms: BufferHandle(0),
            commands: vec![],
        };
        assert_eq!(
            renderer.render(&plan).unwrap_err(),
            RenderError::UnknownHandle {
                kind: "buffer",
                id: 0
            }
        );
    }
}
