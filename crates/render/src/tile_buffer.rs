use std::mem::size_of;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use tilegrid_common::{
    BufferAllocator, BufferHandle, BufferKind, RenderError, Tile, TilemapData, TilemapMeta,
};

use crate::TileGrid;
use crate::autotile::AutoTileLayout;

/// Header of the tilemap storage buffer.
///
/// Byte layout of the whole buffer (little-endian, no padding):
///
/// ```text
/// offset  size  field
///      0     4  f32 tile_size.x
///      4     4  f32 tile_size.y
///      8     4  u32 grid_width
///     12     4  u32 sheet_width
///     16   8*n  n x { u32 sheet_pos, u32 grid_pos }
/// ```
///
/// `Pod` derivation fails to compile if either record gains implicit padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TilemapHeader {
    pub tile_size: [f32; 2],
    pub grid_width: u32,
    pub sheet_width: u32,
}

pub const TILEMAP_HEADER_SIZE: usize = size_of::<TilemapHeader>();
pub const TILE_STRIDE: usize = size_of::<Tile>();

/// Bytes a tilemap draw of `instances` tiles reads, checked against the
/// buffer's current data length.
pub fn check_tile_extent(instances: u32, data_len: u64) -> Result<u64, RenderError> {
    let needed = (TILEMAP_HEADER_SIZE + instances as usize * TILE_STRIDE) as u64;
    if data_len < needed {
        return Err(RenderError::OutOfRange {
            requested: needed,
            available: data_len,
        });
    }
    Ok(needed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    /// Header or length changed; everything is rewritten.
    Full,
    /// Only these tile indices changed in place.
    Tiles(Range<usize>),
}

/// CPU-side mirror of the tilemap storage buffer.
///
/// Edits mark the buffer dirty; `upload` pushes the minimal set of bytes to
/// the allocator. Instance `i` of a tilemap draw renders `tiles()[i]`.
#[derive(Debug, Clone)]
pub struct TileBuffer {
    meta: TilemapMeta,
    tiles: Vec<Tile>,
    handle: Option<BufferHandle>,
    uploaded_len: usize,
    pending: Option<Pending>,
}

impl TileBuffer {
    /// Empty tile buffer with the given metadata.
    pub fn new(meta: TilemapMeta) -> Self {
        Self {
            meta,
            tiles: Vec::new(),
            handle: None,
            uploaded_len: 0,
            pending: Some(Pending::Full),
        }
    }

    pub fn from_data(data: &TilemapData) -> Result<Self, RenderError> {
        let mut buffer = Self::new(data.meta()?);
        buffer.tiles = data.tiles.clone();
        Ok(buffer)
    }

    /// Replace the full tile set and header.
    ///
    /// Rejects zero widths before touching any state. When only tile values
    /// differ, the next upload rewrites just the changed span.
    pub fn set_tiles(
        &mut self,
        tiles: Vec<Tile>,
        tile_size: Vec2,
        grid_width: u32,
        sheet_width: u32,
    ) -> Result<(), RenderError> {
        let meta = TilemapMeta::new(tile_size, grid_width, sheet_width)?;
        if meta == self.meta && tiles.len() == self.tiles.len() {
            let first = self.tiles.iter().zip(&tiles).position(|(a, b)| a != b);
            let last = self.tiles.iter().zip(&tiles).rposition(|(a, b)| a != b);
            if let (Some(first), Some(last)) = (first, last) {
                self.mark(Pending::Tiles(first..last + 1));
            }
        } else {
            self.mark(Pending::Full);
        }
        self.meta = meta;
        self.tiles = tiles;
        Ok(())
    }

    /// Rebuild from an editable grid: one tile per filled cell.
    pub fn sync_grid(
        &mut self,
        grid: &TileGrid,
        tile_size: Vec2,
        sheet_width: u32,
    ) -> Result<(), RenderError> {
        self.set_tiles(grid.to_tiles(), tile_size, grid.width(), sheet_width)
    }

    /// Rebuild from a grid with sheet cells picked from each cell's neighbours.
    pub fn sync_autotiled(
        &mut self,
        grid: &TileGrid,
        tile_size: Vec2,
        layout: &AutoTileLayout,
    ) -> Result<(), RenderError> {
        self.set_tiles(
            grid.to_autotiles(layout),
            tile_size,
            grid.width(),
            layout.sheet_width(),
        )
    }

    /// Overwrite one tile in place.
    pub fn set_tile(&mut self, index: usize, tile: Tile) -> Result<(), RenderError> {
        let available = self.tiles.len() as u64;
        let slot = self
            .tiles
            .get_mut(index)
            .ok_or(RenderError::OutOfRange {
                requested: index as u64,
                available,
            })?;
        if *slot != tile {
            *slot = tile;
            self.mark(Pending::Tiles(index..index + 1));
        }
        Ok(())
    }

    pub fn push_tile(&mut self, tile: Tile) {
        self.tiles.push(tile);
        self.mark(Pending::Full);
    }

    pub fn remove_tile(&mut self, index: usize) -> Result<Tile, RenderError> {
        if index >= self.tiles.len() {
            return Err(RenderError::OutOfRange {
                requested: index as u64,
                available: self.tiles.len() as u64,
            });
        }
        self.mark(Pending::Full);
        Ok(self.tiles.remove(index))
    }

    pub fn clear(&mut self) {
        if !self.tiles.is_empty() {
            self.tiles.clear();
            self.mark(Pending::Full);
        }
    }

    pub fn meta(&self) -> &TilemapMeta {
        &self.meta
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// True when edits have been made since the last upload.
    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    /// Handle of the uploaded buffer, if any upload has happened.
    pub fn handle(&self) -> Option<BufferHandle> {
        self.handle
    }

    pub fn header(&self) -> TilemapHeader {
        TilemapHeader {
            tile_size: self.meta.tile_size().to_array(),
            grid_width: self.meta.grid_width(),
            sheet_width: self.meta.sheet_width(),
        }
    }

    /// Serializable snapshot of the current contents.
    pub fn data(&self) -> TilemapData {
        TilemapData {
            tile_size: self.meta.tile_size().to_array(),
            grid_width: self.meta.grid_width(),
            sheet_width: self.meta.sheet_width(),
            tiles: self.tiles.clone(),
        }
    }

    /// Packed bytes: header followed by the tile array.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(TILEMAP_HEADER_SIZE + self.tiles.len() * TILE_STRIDE);
        bytes.extend_from_slice(bytemuck::bytes_of(&self.header()));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.tiles));
        bytes
    }

    /// Minimum GPU buffer size. A runtime-sized array binding needs room for
    /// at least one element, so an empty map still reserves one tile.
    pub fn gpu_size(&self) -> u64 {
        (TILEMAP_HEADER_SIZE + self.tiles.len().max(1) * TILE_STRIDE) as u64
    }

    /// Push pending edits to the allocator and return the buffer handle.
    ///
    /// Reallocates (growing to the next power of two) only when the packed
    /// size exceeds the current capacity. Re-uploading unchanged data is a
    /// no-op and leaves the buffer byte-identical.
    pub fn upload<A: BufferAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
    ) -> Result<BufferHandle, RenderError> {
        match (self.pending.clone(), self.handle) {
            (None, Some(handle)) => return Ok(handle),
            (Some(Pending::Tiles(range)), Some(handle)) => {
                let offset = (TILEMAP_HEADER_SIZE + range.start * TILE_STRIDE) as u64;
                alloc.write(
                    handle,
                    offset,
                    bytemuck::cast_slice(&self.tiles[range.clone()]),
                )?;
                tracing::debug!(
                    first = range.start,
                    count = range.len(),
                    "tile buffer partial upload"
                );
                self.pending = None;
                return Ok(handle);
            }
            _ => {}
        }

        let bytes = self.to_bytes();
        let required = self.gpu_size();
        let handle = match self.handle {
            Some(handle) if alloc.capacity(handle).is_some_and(|c| c >= required) => handle,
            old => {
                let capacity = required.next_power_of_two();
                let handle = alloc.allocate(BufferKind::Storage, "tilemap_data", capacity)?;
                if let Some(old) = old {
                    alloc.release(old);
                }
                tracing::debug!(capacity, "tile buffer allocated");
                self.uploaded_len = 0;
                self.handle = Some(handle);
                handle
            }
        };

        alloc.write(handle, 0, &bytes)?;
        if self.uploaded_len > bytes.len() {
            let stale = vec![0u8; self.uploaded_len - bytes.len()];
            alloc.write(handle, bytes.len() as u64, &stale)?;
        }
        alloc.set_data_len(handle, bytes.len() as u64)?;
        self.uploaded_len = bytes.len();
        self.pending = None;
        tracing::debug!(
            tiles = self.tiles.len(),
            bytes = bytes.len(),
            "tile buffer full upload"
        );
        Ok(handle)
    }

    /// Free the GPU buffer. The next upload allocates a fresh one.
    pub fn release<A: BufferAllocator + ?Sized>(&mut self, alloc: &mut A) {
        if let Some(handle) = self.handle.take() {
            alloc.release(handle);
        }
        self.uploaded_len = 0;
        self.pending = Some(Pending::Full);
    }

    fn mark(&mut self, change: Pending) {
        self.pending = match (self.pending.take(), change) {
            (Some(Pending::Full), _) | (_, Pending::Full) => Some(Pending::Full),
            (Some(Pending::Tiles(a)), Pending::Tiles(b)) => {
                Some(Pending::Tiles(a.start.min(b.start)..a.end.max(b.end)))
            }
            (None, tiles) => Some(tiles),
        };
    }
}
