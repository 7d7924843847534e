//! Shared types for the tilegrid renderer.
//!
//! # Invariants
//! - A `TilemapMeta` never holds a zero grid or sheet width.
//! - Buffer contents only change through a `BufferAllocator`.

mod alloc;
mod error;
mod types;

pub use alloc::{BufferAllocator, BufferKind, HostAllocator, write_end};
pub use error::RenderError;
pub use types::{
    BufferHandle, QUAD_INDICES, TextureHandle, Tile, TilemapData, TilemapMeta, Vertex,
    split_index, unit_quad,
};
