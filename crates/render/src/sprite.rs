use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};
use tilegrid_common::{RenderError, TextureHandle};

use crate::RenderPass;

/// Per-draw sprite data, passed as push constants (or one instance record
/// when push constants are unavailable).
///
/// 32 bytes: `vec2 world_pos | u32 tile_x | u32 tile_y | vec2 tile_uv_size | vec2 tile_scale`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SpritePush {
    pub world_pos: [f32; 2],
    pub tile_x: u32,
    pub tile_y: u32,
    pub tile_uv_size: [f32; 2],
    pub tile_scale: [f32; 2],
}

pub const SPRITE_PUSH_SIZE: usize = size_of::<SpritePush>();

impl SpritePush {
    pub fn new(world_pos: Vec2, tile: UVec2, tile_uv_size: Vec2, tile_scale: Vec2) -> Self {
        Self {
            world_pos: world_pos.to_array(),
            tile_x: tile.x,
            tile_y: tile.y,
            tile_uv_size: tile_uv_size.to_array(),
            tile_scale: tile_scale.to_array(),
        }
    }
}

/// Texel size a sprite cell is drawn at scale 1.
pub const SPRITE_BASE_TEXELS: u32 = 8;

/// A sprite sheet cut into a `grid_width x grid_height` grid of equal cells,
/// each `tile_width x tile_height` texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteSheet {
    grid: UVec2,
    tile_texels: UVec2,
}

impl SpriteSheet {
    pub fn new(
        grid_width: u32,
        grid_height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Self, RenderError> {
        let grid = UVec2::new(grid_width, grid_height);
        let tile_texels = UVec2::new(tile_width, tile_height);
        if grid.min_element() == 0 || tile_texels.min_element() == 0 {
            return Err(RenderError::InvalidConfig(format!(
                "sprite sheet needs non-zero sizes, got {grid_width}x{grid_height} cells of {tile_width}x{tile_height}"
            )));
        }
        Ok(Self { grid, tile_texels })
    }

    pub fn grid(&self) -> UVec2 {
        self.grid
    }

    /// UV extent of one cell.
    pub fn tile_uv_size(&self) -> Vec2 {
        Vec2::ONE / self.grid.as_vec2()
    }

    /// World units per cell, relative to a cell of [`SPRITE_BASE_TEXELS`].
    pub fn tile_scale(&self) -> Vec2 {
        self.tile_texels.as_vec2() / SPRITE_BASE_TEXELS as f32
    }

    /// Push data for cell `tile` drawn at `world_pos`.
    pub fn push(&self, world_pos: Vec2, tile: UVec2) -> Result<SpritePush, RenderError> {
        if tile.x >= self.grid.x {
            return Err(RenderError::OutOfRange {
                requested: tile.x as u64,
                available: self.grid.x as u64,
            });
        }
        if tile.y >= self.grid.y {
            return Err(RenderError::OutOfRange {
                requested: tile.y as u64,
                available: self.grid.y as u64,
            });
        }
        Ok(SpritePush::new(
            world_pos,
            tile,
            self.tile_uv_size(),
            self.tile_scale(),
        ))
    }
}

/// Dynamically positioned sprites collected for the current frame.
#[derive(Debug, Clone, Default)]
pub struct SpriteInstanceSet {
    instances: Vec<SpritePush>,
}

impl SpriteInstanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sprite(
        &mut self,
        world_pos: Vec2,
        tile_x: u32,
        tile_y: u32,
        tile_uv_size: Vec2,
        tile_scale: Vec2,
    ) {
        self.instances.push(SpritePush::new(
            world_pos,
            UVec2::new(tile_x, tile_y),
            tile_uv_size,
            tile_scale,
        ));
    }

    /// Add a sprite whose UV size and scale come from `sheet`.
    pub fn add_from_sheet(
        &mut self,
        sheet: &SpriteSheet,
        world_pos: Vec2,
        tile: UVec2,
    ) -> Result<(), RenderError> {
        self.instances.push(sheet.push(world_pos, tile)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[SpritePush] {
        &self.instances
    }

    /// Record one draw per sprite into `pass`, in insertion order, and empty the set.
    pub fn flush(&mut self, sprite_sheet: TextureHandle, pass: &mut RenderPass) {
        tracing::trace!(count = self.instances.len(), "flushing sprites");
        for push in self.instances.drain(..) {
            pass.draw_sprite(sprite_sheet, push);
        }
    }
}
