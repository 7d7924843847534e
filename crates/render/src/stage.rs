//! CPU reference versions of the shader stages.
//!
//! These reproduce the WGSL entry points operation for operation so packing,
//! transforms and UV conventions can be checked without a GPU.

use glam::{Mat4, Vec2, Vec3, Vec4};
use tilegrid_common::{Tile, TilemapMeta, Vertex};

use crate::SpritePush;

/// Interpolants leaving the vertex stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexOut {
    pub clip_position: Vec4,
    /// Passed through untouched; the fragment stage does not read it.
    pub color: Vec3,
    pub uv: Vec2,
}

/// Row vector times matrix, as in `vec4 * mat4x4` in WGSL.
pub fn row_mul(v: Vec4, m: &Mat4) -> Vec4 {
    Vec4::new(
        v.dot(m.x_axis),
        v.dot(m.y_axis),
        v.dot(m.z_axis),
        v.dot(m.w_axis),
    )
}

/// UV of a quad corner inside one sheet cell. The V axis is flipped so that
/// vertex-space +y maps to the top of the cell in texture space.
fn cell_uv(cell: Vec2, cell_size: Vec2, position: Vec2) -> Vec2 {
    cell_size * cell + Vec2::new(position.x, 1.0 - position.y) * cell_size
}

/// Tilemap vertex stage for one corner of instance `tile`.
pub fn tilemap_vertex(
    meta: &TilemapMeta,
    tile: Tile,
    vertex: &Vertex,
    world_to_screen: &Mat4,
) -> VertexOut {
    let position = Vec2::from(vertex.position);
    let sheet = meta.sheet_coords(tile).as_vec2();
    let grid = meta.grid_coords(tile).as_vec2();
    VertexOut {
        clip_position: row_mul((position + grid).extend(0.0).extend(1.0), world_to_screen),
        color: Vec3::from(vertex.color),
        uv: cell_uv(sheet, meta.tile_size(), position),
    }
}

/// Sprite vertex stage for one corner of a sprite draw.
///
/// The tile coordinates are added to the world position as well as selecting
/// the sheet cell; the shaders do the same.
pub fn sprite_vertex(push: &SpritePush, vertex: &Vertex, world_to_screen: &Mat4) -> VertexOut {
    let position = Vec2::from(vertex.position);
    let tile = Vec2::new(push.tile_x as f32, push.tile_y as f32);
    let world = Vec2::from(push.world_pos) + position * Vec2::from(push.tile_scale) + tile;
    VertexOut {
        clip_position: row_mul(world.extend(0.0).extend(1.0), world_to_screen),
        color: Vec3::from(vertex.color),
        uv: cell_uv(tile, Vec2::from(push.tile_uv_size), position),
    }
}

/// Texture lookup used by the fragment stage.
pub trait Sampler {
    fn sample(&self, uv: Vec2) -> Vec4;
}

/// Shared fragment stage: the sampled texel, unmodified.
pub fn fragment<S: Sampler + ?Sized>(texture: &S, input: &VertexOut) -> Vec4 {
    texture.sample(input.uv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilegrid_common::unit_quad;

    struct UvColor;

    impl Sampler for UvColor {
        fn sample(&self, uv: Vec2) -> Vec4 {
            Vec4::new(uv.x, uv.y, 0.0, 1.0)
        }
    }

    #[test]
    fn scenario_sheet_pos_five() {
        let meta = TilemapMeta::new(Vec2::splat(16.0), 8, 4).unwrap();
        let corner = Vertex {
            position: [0.0, 1.0],
            color: [1.0, 0.0, 0.0],
        };
        let out = tilemap_vertex(&meta, Tile::new(5, 0), &corner, &Mat4::IDENTITY);
        assert_eq!(out.uv, Vec2::new(16.0, 16.0));
    }

    #[test]
    fn uv_stays_inside_the_sheet_cell() {
        let meta = TilemapMeta::new(Vec2::new(0.125, 0.25), 5, 8).unwrap();
        for sheet_pos in 0..32 {
            let tile = Tile::new(sheet_pos, sheet_pos * 3);
            let cell = meta.sheet_coords(tile).as_vec2();
            let lo = cell * meta.tile_size();
            let hi = (cell + 1.0) * meta.tile_size();
            for v in unit_quad() {
                let uv = tilemap_vertex(&meta, tile, &v, &Mat4::IDENTITY).uv;
                assert!(uv.cmpge(lo - 1e-6).all() && uv.cmple(hi + 1e-6).all());
            }
        }
    }

    #[test]
    fn v_is_flipped_but_position_is_not() {
        let meta = TilemapMeta::new(Vec2::ONE, 4, 4).unwrap();
        let bottom_left = Vertex {
            position: [0.0, 0.0],
            color: [0.0; 3],
        };
        let out = tilemap_vertex(&meta, Tile::new(0, 6), &bottom_left, &Mat4::IDENTITY);
        assert_eq!(out.uv, Vec2::new(0.0, 1.0));
        assert_eq!(out.clip_position, Vec4::new(2.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn sprite_matches_shader_formula() {
        let push = SpritePush {
            world_pos: [10.0, 20.0],
            tile_x: 2,
            tile_y: 3,
            tile_uv_size: [0.25, 0.5],
            tile_scale: [2.0, 4.0],
        };
        let corner = Vertex {
            position: [1.0, 1.0],
            color: [1.0, 1.0, 0.0],
        };
        let out = sprite_vertex(&push, &corner, &Mat4::IDENTITY);
        assert_eq!(out.clip_position, Vec4::new(14.0, 27.0, 0.0, 1.0));
        assert_eq!(out.uv, Vec2::new(0.75, 1.5));
    }

    #[test]
    fn row_mul_is_transposed_product() {
        let m = Mat4::from_cols_array(&std::array::from_fn(|i| (i * i) as f32 - 3.0));
        let v = Vec4::new(1.0, -2.0, 0.5, 1.0);
        assert_eq!(row_mul(v, &m), m.transpose() * v);
    }

    #[test]
    fn fragment_ignores_vertex_color() {
        let a = VertexOut {
            clip_position: Vec4::ZERO,
            color: Vec3::ONE,
            uv: Vec2::new(0.3, 0.6),
        };
        let b = VertexOut {
            color: Vec3::ZERO,
            ..a
        };
        assert_eq!(fragment(&UvColor, &a), fragment(&UvColor, &b));
        assert_eq!(fragment(&UvColor, &a), Vec4::new(0.3, 0.6, 0.0, 1.0));
    }
}
