//! Tile-instance rendering core.
//!
//! Packs tilemaps into storage-buffer bytes, tracks the world-to-screen
//! transform, collects sprite push data and records validated draw commands
//! into a `FramePlan` that a backend executes.
//!
//! # Invariants
//! - A frame plan only references buffers that were uploaded after their last edit.
//! - Instance counts never exceed the tile buffer length.
//! - Transform state is passed explicitly; nothing here is global.

mod autotile;
mod camera;
mod config;
mod grid;
mod pass;
mod renderer;
mod sprite;
pub mod stage;
mod tile_buffer;
mod transform;

pub use autotile::{AUTOTILE_BLOCK, AutoTileLayout, Orientation, block_cell};
pub use camera::{OrthoCamera, viewport_to_ndc};
pub use config::{RenderConfig, SpriteMode};
pub use grid::TileGrid;
pub use pass::{DrawCommand, FramePlan, RenderPass};
pub use renderer::{DebugRenderer, FrameReport, HostTexture, QuadKind, QuadReport, Renderer};
pub use sprite::{
    SPRITE_BASE_TEXELS, SPRITE_PUSH_SIZE, SpriteInstanceSet, SpritePush, SpriteSheet,
};
pub use tile_buffer::{
    TILE_STRIDE, TILEMAP_HEADER_SIZE, TileBuffer, TilemapHeader, check_tile_extent,
};
pub use transform::{TRANSFORMS_SIZE, TransformState};

pub use tilegrid_common::{
    BufferAllocator, BufferHandle, BufferKind, HostAllocator, RenderError, TextureHandle, Tile,
    TilemapData, TilemapMeta,
};
