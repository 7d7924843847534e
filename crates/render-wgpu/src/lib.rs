//! wgpu render backend for tilegrid.
//!
//! Executes `FramePlan`s with two pipelines: instanced tilemap quads reading
//! a storage buffer, and sprite quads fed by push constants (or an instance
//! buffer on devices without them).
//!
//! # Invariants
//! - Bindings are fixed: 0 transforms, 1 tilemap data, 3 sheet texture, 4 sampler.
//! - Every handle in a plan is checked before anything is encoded.
//! - Host writes go through `Queue::write_buffer` and land before the next submit.

mod gpu;
mod headless;
mod shaders;

pub use gpu::{FrameStats, SpriteBatch, SpritePath, WgpuTileRenderer, resolve_sprite_path};
pub use headless::{OFFSCREEN_FORMAT, OffscreenTarget, request_headless_device};
