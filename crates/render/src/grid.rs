use glam::{UVec2, Vec2};
use tilegrid_common::{RenderError, Tile};

use crate::autotile::{AutoTileLayout, Orientation};

/// Editable tile map: a `width x height` grid where each cell is either empty
/// or shows one sheet cell.
///
/// Grid cell `(x, y)` covers world space `[x, x+1) x [y, y+1)`, matching where
/// the tilemap vertex stage places a tile with that grid position.
///
/// Each filled cell also tracks which of its neighbours are filled. Edits
/// refresh the cell and its eight neighbours; cells off the grid count as
/// filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    cells: Vec<Option<u32>>,
    orientations: Vec<Orientation>,
}

impl TileGrid {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidConfig(format!(
                "grid size must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            cells: vec![None; width as usize * height as usize],
            orientations: vec![Orientation::empty(); width as usize * height as usize],
        })
    }

    /// Grid with every cell showing `sheet_pos`.
    pub fn filled(width: u32, height: u32, sheet_pos: u32) -> Result<Self, RenderError> {
        let mut grid = Self::new(width, height)?;
        grid.cells.fill(Some(sheet_pos));
        grid.orientations.fill(Orientation::all());
        Ok(grid)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Result<Option<u32>, RenderError> {
        let i = self.index(x, y)?;
        Ok(self.cells[i])
    }

    /// Fill a cell. Returns the previous sheet position.
    pub fn set(&mut self, x: u32, y: u32, sheet_pos: u32) -> Result<Option<u32>, RenderError> {
        let i = self.index(x, y)?;
        let prev = self.cells[i].replace(sheet_pos);
        if prev.is_none() {
            self.refresh_around(x, y);
        }
        Ok(prev)
    }

    /// Empty a cell. Returns the previous sheet position.
    pub fn clear(&mut self, x: u32, y: u32) -> Result<Option<u32>, RenderError> {
        let i = self.index(x, y)?;
        let prev = self.cells[i].take();
        if prev.is_some() {
            self.refresh_around(x, y);
        }
        Ok(prev)
    }

    /// Flip a cell between empty and `sheet_pos`. Returns true if it is now filled.
    pub fn toggle(&mut self, x: u32, y: u32, sheet_pos: u32) -> Result<bool, RenderError> {
        let i = self.index(x, y)?;
        let cell = &mut self.cells[i];
        *cell = match cell {
            Some(_) => None,
            None => Some(sheet_pos),
        };
        let filled = cell.is_some();
        self.refresh_around(x, y);
        Ok(filled)
    }

    /// Filled neighbours of a filled cell; `None` for an empty one.
    pub fn orientation(&self, x: u32, y: u32) -> Result<Option<Orientation>, RenderError> {
        let i = self.index(x, y)?;
        Ok(self.cells[i].map(|_| self.orientations[i]))
    }

    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// One tile per filled cell, in ascending `grid_pos` order.
    pub fn to_tiles(&self) -> Vec<Tile> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| cell.map(|sheet_pos| Tile::new(sheet_pos, i as u32)))
            .collect()
    }

    /// Like [`to_tiles`](Self::to_tiles), but each sheet position comes from
    /// the cell's neighbours instead of what was stored.
    pub fn to_autotiles(&self, layout: &AutoTileLayout) -> Vec<Tile> {
        (0..self.cells.len())
            .filter(|&i| self.cells[i].is_some())
            .map(|i| {
                let cell = UVec2::new(i as u32 % self.width, i as u32 / self.width);
                Tile::new(layout.sheet_pos(self.orientations[i], cell), i as u32)
            })
            .collect()
    }

    /// Cell containing a world-space point, if it lies on the grid.
    pub fn cell_at(&self, world: Vec2) -> Option<UVec2> {
        if !world.is_finite() || world.x < 0.0 || world.y < 0.0 {
            return None;
        }
        let cell = world.floor().as_uvec2();
        (cell.x < self.width && cell.y < self.height).then_some(cell)
    }

    fn index(&self, x: u32, y: u32) -> Result<usize, RenderError> {
        if x >= self.width {
            return Err(RenderError::OutOfRange {
                requested: x as u64,
                available: self.width as u64,
            });
        }
        if y >= self.height {
            return Err(RenderError::OutOfRange {
                requested: y as u64,
                available: self.height as u64,
            });
        }
        Ok(y as usize * self.width as usize + x as usize)
    }

    fn neighbour(&self, x: u32, y: u32, dx: i32, dy: i32) -> Option<(u32, u32)> {
        let nx = x.checked_add_signed(dx)?;
        let ny = y.checked_add_signed(dy)?;
        (nx < self.width && ny < self.height).then_some((nx, ny))
    }

    fn is_filled(&self, x: u32, y: u32) -> bool {
        self.cells[y as usize * self.width as usize + x as usize].is_some()
    }

    fn neighbours_of(&self, x: u32, y: u32) -> Orientation {
        Orientation::NEIGHBOURS
            .iter()
            .filter(|(_, dx, dy)| {
                self.neighbour(x, y, *dx, *dy)
                    .is_none_or(|(nx, ny)| self.is_filled(nx, ny))
            })
            .fold(Orientation::empty(), |acc, (dir, _, _)| acc | *dir)
    }

    fn refresh_around(&mut self, x: u32, y: u32) {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let Some((nx, ny)) = self.neighbour(x, y, dx, dy) else {
                    continue;
                };
                let orientation = if self.is_filled(nx, ny) {
                    self.neighbours_of(nx, ny)
                } else {
                    Orientation::empty()
                };
                self.orientations[ny as usize * self.width as usize + nx as usize] = orientation;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_grid_is_invalid() {
        assert!(matches!(
            TileGrid::new(0, 4),
            Err(RenderError::InvalidConfig(_))
        ));
        assert!(TileGrid::new(4, 0).is_err());
    }

    #[test]
    fn toggle_flips_cells() {
        let mut grid = TileGrid::new(16, 16).unwrap();
        assert!(grid.toggle(3, 2, 7).unwrap());
        assert_eq!(grid.get(3, 2).unwrap(), Some(7));
        assert!(!grid.toggle(3, 2, 7).unwrap());
        assert_eq!(grid.get(3, 2).unwrap(), None);
    }

    #[test]
    fn tiles_are_ordered_by_grid_pos() {
        let mut grid = TileGrid::new(4, 4).unwrap();
        grid.set(2, 3, 1).unwrap();
        grid.set(1, 0, 9).unwrap();
        grid.set(0, 1, 4).unwrap();
        assert_eq!(
            grid.to_tiles(),
            vec![Tile::new(9, 1), Tile::new(4, 4), Tile::new(1, 14)]
        );
        assert_eq!(grid.filled_count(), 3);
        assert_eq!(grid.clear(1, 0).unwrap(), Some(9));
        assert_eq!(grid.filled_count(), 2);
    }

    #[test]
    fn out_of_bounds_cells() {
        let mut grid = TileGrid::new(4, 2).unwrap();
        assert_eq!(
            grid.set(4, 0, 1),
            Err(RenderError::OutOfRange {
                requested: 4,
                available: 4
            })
        );
        assert!(grid.get(0, 2).is_err());
    }

    #[test]
    fn cell_at_picks_world_points() {
        let grid = TileGrid::filled(16, 16, 0).unwrap();
        assert_eq!(grid.cell_at(Vec2::new(3.5, 0.2)), Some(UVec2::new(3, 0)));
        assert_eq!(grid.cell_at(Vec2::new(-0.1, 2.0)), None);
        assert_eq!(grid.cell_at(Vec2::new(16.0, 2.0)), None);
        assert_eq!(grid.cell_at(Vec2::NAN), None);
        assert_eq!(grid.cell_at(Vec2::new(2.0, f32::NAN)), None);
        assert_eq!(grid.cell_at(Vec2::new(f32::INFINITY, 1.0)), None);
        assert_eq!(grid.filled_count(), 256);
    }

    fn filled_block(grid: &mut TileGrid, min: u32, max: u32) {
        for y in min..=max {
            for x in min..=max {
                grid.set(x, y, 0).unwrap();
            }
        }
    }

    #[test]
    fn block_cells_see_their_neighbours() {
        let mut grid = TileGrid::new(5, 5).unwrap();
        filled_block(&mut grid, 1, 3);

        let at = |x, y| grid.orientation(x, y).unwrap().unwrap();
        assert_eq!(at(2, 2), Orientation::all());
        assert_eq!(
            at(1, 1),
            Orientation::S | Orientation::E | Orientation::SE
        );
        assert_eq!(
            at(2, 1),
            Orientation::S | Orientation::E | Orientation::W | Orientation::SE | Orientation::SW
        );
        assert_eq!(
            at(3, 3),
            Orientation::N | Orientation::W | Orientation::NW
        );
        assert_eq!(grid.orientation(0, 0).unwrap(), None);
    }

    #[test]
    fn off_grid_neighbours_count_as_filled() {
        let grid = TileGrid::filled(1, 1, 0).unwrap();
        assert_eq!(grid.orientation(0, 0).unwrap(), Some(Orientation::all()));

        let mut grid = TileGrid::new(3, 1).unwrap();
        grid.set(0, 0, 0).unwrap();
        let left = grid.orientation(0, 0).unwrap().unwrap();
        assert!(left.contains(Orientation::W | Orientation::N | Orientation::S));
        assert!(!left.contains(Orientation::E));
    }

    #[test]
    fn edits_refresh_neighbours() {
        let mut grid = TileGrid::new(5, 5).unwrap();
        filled_block(&mut grid, 1, 3);

        assert!(!grid.toggle(2, 2, 0).unwrap());
        let above = grid.orientation(2, 1).unwrap().unwrap();
        assert!(!above.contains(Orientation::S));
        let corner = grid.orientation(1, 1).unwrap().unwrap();
        assert!(!corner.contains(Orientation::SE));

        assert!(grid.toggle(2, 2, 0).unwrap());
        assert!(grid.orientation(2, 1).unwrap().unwrap().contains(Orientation::S));

        grid.clear(3, 2).unwrap();
        grid.set(4, 4, 0).unwrap();
        let mut rebuilt = TileGrid::new(5, 5).unwrap();
        for (x, y) in [(4, 4), (3, 3), (3, 1), (2, 3), (1, 3), (2, 2), (1, 2), (2, 1), (1, 1)] {
            rebuilt.set(x, y, 0).unwrap();
        }
        assert_eq!(grid, rebuilt);
    }

    #[test]
    fn autotiles_pick_corners_edges_and_interior() {
        let mut grid = TileGrid::new(5, 5).unwrap();
        filled_block(&mut grid, 1, 3);
        let layout = AutoTileLayout::new(UVec2::ZERO, 8).unwrap();
        let tiles = grid.to_autotiles(&layout);
        assert_eq!(tiles.len(), 9);

        let sheet_cell = |x: u32, y: u32| {
            let grid_pos = y * 5 + x;
            let tile = tiles.iter().find(|t| t.grid_pos == grid_pos).unwrap();
            UVec2::new(tile.sheet_pos % 8, tile.sheet_pos / 8)
        };
        assert_eq!(sheet_cell(1, 1), UVec2::new(0, 0));
        assert_eq!(sheet_cell(3, 1), UVec2::new(5, 0));
        assert_eq!(sheet_cell(1, 3), UVec2::new(0, 5));
        assert_eq!(sheet_cell(3, 3), UVec2::new(5, 5));
        assert_eq!(sheet_cell(2, 1).y, 0);
        assert_eq!(sheet_cell(3, 2).x, 5);
        assert_eq!(sheet_cell(2, 3).y, 5);
        assert_eq!(sheet_cell(1, 2).x, 0);
        let centre = sheet_cell(2, 2);
        assert!((1..=4).contains(&centre.x) && (1..=4).contains(&centre.y));
    }
}
