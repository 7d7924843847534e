/// Transform uniform and the vertex interface shared by every pipeline.
///
/// Positions are row vectors: `vec4 * world_to_screen`.
const COMMON: &str = r#"
struct Transforms {
    world_to_screen: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> transforms: Transforms;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) color: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
    @location(1) uv: vec2<f32>,
};
"#;

/// Shared fragment stage. `color` is interpolated but not read.
const FRAGMENT: &str = r#"
@group(0) @binding(3)
var sheet_texture: texture_2d<f32>;
@group(0) @binding(4)
var sheet_sampler: sampler;

@fragment
fn fs_sheet(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(sheet_texture, sheet_sampler, in.uv);
}
"#;

const TILEMAP: &str = r#"
struct Tile {
    sheet_pos: u32,
    grid_pos: u32,
};

struct TilemapData {
    tile_size: vec2<f32>,
    grid_width: u32,
    sheet_width: u32,
    tiles: array<Tile>,
};

@group(0) @binding(1)
var<storage, read> tilemap: TilemapData;

@vertex
fn vs_tilemap(vertex: VertexInput, @builtin(instance_index) instance: u32) -> VertexOutput {
    let tile = tilemap.tiles[instance];
    let sheet = vec2<f32>(
        f32(tile.sheet_pos % tilemap.sheet_width),
        f32(tile.sheet_pos / tilemap.sheet_width),
    );
    let grid = vec2<f32>(
        f32(tile.grid_pos % tilemap.grid_width),
        f32(tile.grid_pos / tilemap.grid_width),
    );

    var out: VertexOutput;
    out.uv = tilemap.tile_size * sheet
        + vec2<f32>(vertex.position.x, 1.0 - vertex.position.y) * tilemap.tile_size;
    out.color = vertex.color;
    out.clip_position = vec4<f32>(vertex.position + grid, 0.0, 1.0) * transforms.world_to_screen;
    return out;
}
"#;

const SPRITE_COMMON: &str = r#"
struct SpritePush {
    world_pos: vec2<f32>,
    tile_x: u32,
    tile_y: u32,
    tile_uv_size: vec2<f32>,
    tile_scale: vec2<f32>,
};

fn place_sprite(vertex: VertexInput, sprite: SpritePush) -> VertexOutput {
    let tile = vec2<f32>(f32(sprite.tile_x), f32(sprite.tile_y));

    var out: VertexOutput;
    out.uv = sprite.tile_uv_size * tile
        + vec2<f32>(vertex.position.x, 1.0 - vertex.position.y) * sprite.tile_uv_size;
    out.color = vertex.color;
    out.clip_position = vec4<f32>(
        sprite.world_pos + vertex.position * sprite.tile_scale + tile,
        0.0,
        1.0,
    ) * transforms.world_to_screen;
    return out;
}
"#;

const SPRITE_PUSH: &str = r#"
var<push_constant> sprite_push: SpritePush;

@vertex
fn vs_sprite(vertex: VertexInput) -> VertexOutput {
    return place_sprite(vertex, sprite_push);
}
"#;

const SPRITE_INSTANCED: &str = r#"
struct SpriteInstance {
    @location(2) world_pos: vec2<f32>,
    @location(3) tile: vec2<u32>,
    @location(4) tile_uv_size: vec2<f32>,
    @location(5) tile_scale: vec2<f32>,
};

@vertex
fn vs_sprite(vertex: VertexInput, instance: SpriteInstance) -> VertexOutput {
    let sprite = SpritePush(
        instance.world_pos,
        instance.tile.x,
        instance.tile.y,
        instance.tile_uv_size,
        instance.tile_scale,
    );
    return place_sprite(vertex, sprite);
}
"#;

pub const TILEMAP_VS_ENTRY: &str = "vs_tilemap";
pub const SPRITE_VS_ENTRY: &str = "vs_sprite";
pub const FS_ENTRY: &str = "fs_sheet";

/// Tilemap vertex stage plus the shared fragment stage.
pub fn tilemap_shader() -> String {
    [COMMON, TILEMAP, FRAGMENT].concat()
}

/// Sprite vertex stage reading push constants.
pub fn sprite_push_shader() -> String {
    [COMMON, SPRITE_COMMON, SPRITE_PUSH, FRAGMENT].concat()
}

/// Sprite vertex stage reading per-instance attributes.
pub fn sprite_instanced_shader() -> String {
    [COMMON, SPRITE_COMMON, SPRITE_INSTANCED, FRAGMENT].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_shader_has_the_fixed_bindings() {
        for src in [
            tilemap_shader(),
            sprite_push_shader(),
            sprite_instanced_shader(),
        ] {
            assert!(src.contains("@binding(0)"));
            assert!(src.contains("@binding(3)"));
            assert!(src.contains("@binding(4)"));
            assert!(src.contains(FS_ENTRY));
            assert!(src.contains("* transforms.world_to_screen"));
        }
        assert!(tilemap_shader().contains("@binding(1)"));
        assert!(!sprite_push_shader().contains("@binding(1)"));
    }

    #[test]
    fn push_constants_only_in_push_variant() {
        assert!(sprite_push_shader().contains("var<push_constant>"));
        assert!(!sprite_instanced_shader().contains("var<push_constant>"));
        assert!(sprite_instanced_shader().contains(SPRITE_VS_ENTRY));
        assert!(tilemap_shader().contains(TILEMAP_VS_ENTRY));
    }
}
