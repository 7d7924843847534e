use tilegrid_common::{BufferHandle, RenderError, TextureHandle};

use crate::{SpritePush, TileBuffer, TransformState};

/// One validated draw.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Instanced unit quads, instance `i` reading tile `i` of `tiles`.
    Tilemap {
        tiles: BufferHandle,
        sheet: TextureHandle,
        instances: u32,
    },
    /// A single sprite quad with its push data.
    Sprite {
        sheet: TextureHandle,
        push: SpritePush,
    },
}

/// Everything a backend needs to execute one frame, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub transforms: BufferHandle,
    pub commands: Vec<DrawCommand>,
}

impl FramePlan {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Total tile instances across all tilemap draws.
    pub fn tile_instances(&self) -> u64 {
        self.commands
            .iter()
            .map(|c| match c {
                DrawCommand::Tilemap { instances, .. } => *instances as u64,
                DrawCommand::Sprite { .. } => 0,
            })
            .sum()
    }

    pub fn sprite_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Sprite { .. }))
            .count()
    }
}

/// Records draws for one frame, validating each before it is accepted.
///
/// All checks happen here, so a finished plan never needs to fail halfway
/// through submission.
#[derive(Debug)]
pub struct RenderPass {
    plan: FramePlan,
}

impl RenderPass {
    /// Start a frame. The transform must be uploaded.
    pub fn begin(transforms: &TransformState) -> Result<Self, RenderError> {
        let handle = transforms
            .handle()
            .filter(|_| !transforms.is_dirty())
            .ok_or(RenderError::NotUploaded("transform state"))?;
        Ok(Self {
            plan: FramePlan {
                transforms: handle,
                commands: Vec::new(),
            },
        })
    }

    /// Draw the first `instance_count` tiles of `tiles`.
    ///
    /// An instance count of zero records nothing.
    pub fn draw_tilemap(
        &mut self,
        tiles: &TileBuffer,
        sheet: TextureHandle,
        instance_count: u32,
    ) -> Result<(), RenderError> {
        if instance_count as usize > tiles.len() {
            return Err(RenderError::OutOfRange {
                requested: instance_count as u64,
                available: tiles.len() as u64,
            });
        }
        if instance_count == 0 {
            tracing::trace!("empty tilemap draw skipped");
            return Ok(());
        }
        let handle = tiles
            .handle()
            .filter(|_| !tiles.is_dirty())
            .ok_or(RenderError::NotUploaded("tile buffer"))?;
        self.plan.commands.push(DrawCommand::Tilemap {
            tiles: handle,
            sheet,
            instances: instance_count,
        });
        Ok(())
    }

    /// Draw every tile in `tiles`.
    pub fn draw_all_tiles(
        &mut self,
        tiles: &TileBuffer,
        sheet: TextureHandle,
    ) -> Result<(), RenderError> {
        let count = u32::try_from(tiles.len()).map_err(|_| RenderError::OutOfRange {
            requested: tiles.len() as u64,
            available: u32::MAX as u64,
        })?;
        self.draw_tilemap(tiles, sheet, count)
    }

    pub fn draw_sprite(&mut self, sheet: TextureHandle, push: SpritePush) {
        self.plan.commands.push(DrawCommand::Sprite { sheet, push });
    }

    pub fn finish(self) -> FramePlan {
        tracing::trace!(draws = self.plan.commands.len(), "frame plan finished");
        self.plan
    }
}
