use std::num::NonZeroU32;

use bitflags::bitflags;
use glam::UVec2;
use tilegrid_common::RenderError;

bitflags! {
    /// Which of a cell's eight neighbours are filled.
    ///
    /// North is the row above on screen (`y - 1`), matching the camera's
    /// y-down world.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Orientation: u8 {
        const N = 1 << 0;
        const S = 1 << 1;
        const E = 1 << 2;
        const W = 1 << 3;
        const NE = 1 << 4;
        const NW = 1 << 5;
        const SE = 1 << 6;
        const SW = 1 << 7;
    }
}

impl Orientation {
    /// Each direction with its `(dx, dy)` grid offset.
    pub const NEIGHBOURS: [(Orientation, i32, i32); 8] = [
        (Orientation::N, 0, -1),
        (Orientation::S, 0, 1),
        (Orientation::E, 1, 0),
        (Orientation::W, -1, 0),
        (Orientation::NE, 1, -1),
        (Orientation::NW, -1, -1),
        (Orientation::SE, 1, 1),
        (Orientation::SW, -1, 1),
    ];

    /// The direction pointing at a neighbour offset, if it is one.
    pub fn from_offset(dx: i32, dy: i32) -> Option<Self> {
        Self::NEIGHBOURS
            .iter()
            .find(|(_, ox, oy)| (*ox, *oy) == (dx, dy))
            .map(|(dir, _, _)| *dir)
    }
}

/// Side length of the auto-tile block on the sheet: a border ring of edge and
/// corner cells around 4x4 interior variants.
pub const AUTOTILE_BLOCK: u32 = 6;

/// Where the auto-tile block sits on a tile sheet.
///
/// ```text
///   (0,0) top-left   (1..=4,0) top edge     (5,0) top-right
///   (0,1..=4) left   (1..=4,1..=4) interior (5,1..=4) right
///   (0,5) bot-left   (1..=4,5) bottom edge  (5,5) bot-right
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoTileLayout {
    origin: UVec2,
    sheet_width: NonZeroU32,
}

impl AutoTileLayout {
    /// Block with its top-left cell at `origin` on a sheet `sheet_width` cells wide.
    pub fn new(origin: UVec2, sheet_width: u32) -> Result<Self, RenderError> {
        let sheet_width = NonZeroU32::new(sheet_width)
            .ok_or_else(|| RenderError::InvalidConfig("sheet_width must be non-zero".into()))?;
        if origin.x.saturating_add(AUTOTILE_BLOCK) > sheet_width.get() {
            return Err(RenderError::InvalidConfig(format!(
                "auto-tile block at column {} does not fit a {} cell wide sheet",
                origin.x, sheet_width
            )));
        }
        Ok(Self {
            origin,
            sheet_width,
        })
    }

    pub fn origin(&self) -> UVec2 {
        self.origin
    }

    pub fn sheet_width(&self) -> u32 {
        self.sheet_width.get()
    }

    /// Sheet index for a filled cell at `cell` with the given neighbours.
    pub fn sheet_pos(&self, orientation: Orientation, cell: UVec2) -> u32 {
        let local = block_cell(orientation, cell) + self.origin;
        local.x + local.y * self.sheet_width.get()
    }
}

/// Cell inside the block for a tile. Only the four edge neighbours pick
/// borders; diagonal neighbours are tracked but do not change the choice.
///
/// Variants along edges and in the interior are a fixed hash of the grid
/// cell, so a rebuild always gives the same sheet cells.
pub fn block_cell(orientation: Orientation, cell: UVec2) -> UVec2 {
    let n = orientation.contains(Orientation::N);
    let s = orientation.contains(Orientation::S);
    let e = orientation.contains(Orientation::E);
    let w = orientation.contains(Orientation::W);
    let variant = |salt: u32| {
        let h = cell
            .x
            .wrapping_mul(7)
            .wrapping_add(cell.y.wrapping_mul(13))
            .wrapping_add(salt.wrapping_mul(5));
        1 + h % 4
    };
    let last = AUTOTILE_BLOCK - 1;
    let (x, y) = match (n, e, s, w) {
        (false, true, true, true) => (variant(0), 0),
        (true, false, true, true) => (last, variant(0)),
        (true, true, false, true) => (variant(0), last),
        (true, true, true, false) => (0, variant(0)),
        (true, false, false, true) => (last, last),
        (false, true, true, false) => (0, 0),
        (false, false, true, true) => (last, 0),
        (true, true, false, false) => (0, last),
        _ => (variant(0), variant(1)),
    };
    UVec2::new(x, y)
}
