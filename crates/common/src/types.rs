use std::num::NonZeroU32;

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};
use serde::{Deserialize, Serialize};

use crate::RenderError;

/// Opaque handle to a buffer owned by a `BufferAllocator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Opaque handle to a sheet texture owned by a render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// One tile instance: which sheet cell to show, and where on the grid.
///
/// Layout matches the shader's `Tile` struct: two `u32`, 8 bytes, no padding.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct Tile {
    pub sheet_pos: u32,
    pub grid_pos: u32,
}

impl Tile {
    pub fn new(sheet_pos: u32, grid_pos: u32) -> Self {
        Self {
            sheet_pos,
            grid_pos,
        }
    }
}

/// Split a linear index into `(index % width, index / width)`.
pub fn split_index(index: u32, width: NonZeroU32) -> UVec2 {
    let w = width.get();
    UVec2::new(index % w, index / w)
}

/// Per-frame metadata describing how to interpret tile buffer contents.
///
/// Both widths are non-zero by construction, so the decompositions below never
/// divide by zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilemapMeta {
    tile_size: Vec2,
    grid_width: NonZeroU32,
    sheet_width: NonZeroU32,
}

impl TilemapMeta {
    pub fn new(tile_size: Vec2, grid_width: u32, sheet_width: u32) -> Result<Self, RenderError> {
        let grid_width = NonZeroU32::new(grid_width)
            .ok_or_else(|| RenderError::InvalidConfig("grid_width must be non-zero".into()))?;
        let sheet_width = NonZeroU32::new(sheet_width)
            .ok_or_else(|| RenderError::InvalidConfig("sheet_width must be non-zero".into()))?;
        Ok(Self {
            tile_size,
            grid_width,
            sheet_width,
        })
    }

    pub fn tile_size(&self) -> Vec2 {
        self.tile_size
    }

    pub fn grid_width(&self) -> u32 {
        self.grid_width.get()
    }

    pub fn sheet_width(&self) -> u32 {
        self.sheet_width.get()
    }

    /// `(sheet_x, sheet_y)` of a tile inside the tile sheet.
    pub fn sheet_coords(&self, tile: Tile) -> UVec2 {
        split_index(tile.sheet_pos, self.sheet_width)
    }

    /// `(grid_x, grid_y)` of a tile inside the world grid.
    pub fn grid_coords(&self, tile: Tile) -> UVec2 {
        split_index(tile.grid_pos, self.grid_width)
    }
}

/// Serializable form of a whole tilemap, as stored in map files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilemapData {
    pub tile_size: [f32; 2],
    pub grid_width: u32,
    pub sheet_width: u32,
    #[serde(default)]
    pub tiles: Vec<Tile>,
}

impl TilemapData {
    /// Validate the header fields.
    pub fn meta(&self) -> Result<TilemapMeta, RenderError> {
        TilemapMeta::new(Vec2::from(self.tile_size), self.grid_width, self.sheet_width)
    }
}

/// Per-vertex input shared by both draw paths.
///
/// `color` reaches the fragment stage but is not read there; it is kept so the
/// attribute layout stays stable if tinting is added.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

/// Index list for `unit_quad`, two triangles.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 0, 3];

/// Unit quad spanning `(0,0)..(1,1)`, reused by the tilemap and sprite paths.
pub fn unit_quad() -> [Vertex; 4] {
    #[rustfmt::skip]
    let quad = [
        Vertex { position: [1.0, 0.0], color: [0.0, 0.0, 1.0] },
        Vertex { position: [0.0, 0.0], color: [0.0, 1.0, 0.0] },
        Vertex { position: [0.0, 1.0], color: [1.0, 0.0, 0.0] },
        Vertex { position: [1.0, 1.0], color: [1.0, 1.0, 0.0] },
    ];
    quad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(v: u32) -> NonZeroU32 {
        NonZeroU32::new(v).unwrap()
    }

    #[test]
    fn split_index_is_inverse_of_linearization() {
        for width in 1..9u32 {
            for index in 0..100u32 {
                let c = split_index(index, nz(width));
                assert!(c.x < width);
                assert_eq!(c.x + c.y * width, index);
            }
        }
    }

    #[test]
    fn meta_rejects_zero_widths() {
        assert!(matches!(
            TilemapMeta::new(Vec2::ONE, 0, 4),
            Err(RenderError::InvalidConfig(_))
        ));
        assert!(matches!(
            TilemapMeta::new(Vec2::ONE, 4, 0),
            Err(RenderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn sheet_coords_scenario() {
        let meta = TilemapMeta::new(Vec2::splat(16.0), 8, 4).unwrap();
        let c = meta.sheet_coords(Tile::new(5, 0));
        assert_eq!(c, UVec2::new(1, 1));
        assert_eq!(meta.tile_size() * c.as_vec2(), Vec2::new(16.0, 16.0));
    }

    #[test]
    fn grid_width_one_is_a_single_column() {
        let meta = TilemapMeta::new(Vec2::ONE, 1, 4).unwrap();
        for pos in 0..32 {
            let c = meta.grid_coords(Tile::new(0, pos));
            assert_eq!(c.x, 0);
            assert_eq!(c.y, pos);
        }
    }

    #[test]
    fn tilemap_data_from_json() {
        let json = r#"{
            "tile_size": [16.0, 16.0],
            "grid_width": 16,
            "sheet_width": 8,
            "tiles": [{ "sheet_pos": 3, "grid_pos": 17 }]
        }"#;
        let data: TilemapData = serde_json::from_str(json).unwrap();
        assert_eq!(data.tiles, vec![Tile::new(3, 17)]);
        let meta = data.meta().unwrap();
        assert_eq!(meta.grid_coords(data.tiles[0]), UVec2::new(1, 1));
    }

    #[test]
    fn tile_and_vertex_sizes() {
        assert_eq!(std::mem::size_of::<Tile>(), 8);
        assert_eq!(std::mem::size_of::<Vertex>(), 20);
        let quad = unit_quad();
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < quad.len()));
    }
}
