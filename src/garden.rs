use glam::{Vec2, Vec3};

/// Tiles per side of the garden.
pub const GRID_SIZE: usize = 20;
/// World-space edge length of one tile.
pub const TILE_SIZE: f32 = 2.0;
/// Reach of the watering can around the player.
pub const WATERING_RADIUS: f32 = 3.0;

/// Dry soil and freshly watered tile colors.
pub const DRY_COLOR: Vec3 = Vec3::new(0.45, 0.35, 0.22);
pub const WATERED_COLOR: Vec3 = Vec3::new(0.27, 0.52, 0.21);

/// One cell of the garden. The center is fixed at construction; the watered
/// flag only ever goes false → true.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub center: Vec2,
    pub watered: bool,
}

/// Fixed 20×20 grid of waterable tiles spanning the arena floor. Allocated
/// once, never resized, tiles never revert.
#[derive(Debug, Clone)]
pub struct WateringGrid {
    tiles: Vec<Tile>,
}

impl Default for WateringGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl WateringGrid {
    pub fn new() -> Self {
        let half = GRID_SIZE as f32 * TILE_SIZE / 2.0;
        let mut tiles = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
        for row in 0..GRID_SIZE {
            for col in 0..GRID_SIZE {
                let center = Vec2::new(
                    -half + TILE_SIZE * (col as f32 + 0.5),
                    -half + TILE_SIZE * (row as f32 + 0.5),
                );
                tiles.push(Tile {
                    center,
                    watered: false,
                });
            }
        }
        Self { tiles }
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }

    /// World-store object name for the tile at `index`.
    pub fn tile_name(index: usize) -> String {
        let row = index / GRID_SIZE;
        let col = index % GRID_SIZE;
        format!("tile_{row}_{col}")
    }

    /// Waters every still-dry tile whose center lies within `radius` of
    /// `center` and returns their indices, in grid order. An empty result
    /// means nothing changed state.
    pub fn water(&mut self, center: Vec2, radius: f32) -> Vec<usize> {
        let radius_sq = radius * radius;
        let mut changed = Vec::new();
        for (index, tile) in self.tiles.iter_mut().enumerate() {
            if tile.watered {
                continue;
            }
            if tile.center.distance_squared(center) <= radius_sq {
                tile.watered = true;
                changed.push(index);
            }
        }
        changed
    }

    pub fn watered_count(&self) -> usize {
        self.tiles.iter().filter(|tile| tile.watered).count()
    }

    pub fn is_fully_watered(&self) -> bool {
        self.tiles.iter().all(|tile| tile.watered)
    }

    /// Completion percentage, rounded; feeds the hint text only.
    pub fn progress_percent(&self) -> u32 {
        let total = self.tiles.len() as f32;
        (self.watered_count() as f32 / total * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_spans_the_arena_with_odd_integer_centers() {
        let grid = WateringGrid::new();
        assert_eq!(grid.tile_count(), 400);
        assert_eq!(grid.tile(0).unwrap().center, Vec2::new(-19.0, -19.0));
        assert_eq!(grid.tile(399).unwrap().center, Vec2::new(19.0, 19.0));
    }

    #[test]
    fn watering_marks_exactly_the_tiles_within_radius_of_origin() {
        let mut grid = WateringGrid::new();
        let changed = grid.water(Vec2::ZERO, 8.0);
        assert!(!changed.is_empty());

        for tile in grid.tiles() {
            let expected = tile.center.length() <= 8.0;
            assert_eq!(tile.watered, expected, "tile at {:?}", tile.center);
        }
        assert_eq!(changed.len(), grid.watered_count());
    }

    #[test]
    fn watered_tiles_never_revert_and_are_not_reported_twice() {
        let mut grid = WateringGrid::new();
        let first = grid.water(Vec2::ZERO, 5.0);
        assert!(!first.is_empty());
        let again = grid.water(Vec2::ZERO, 5.0);
        assert!(again.is_empty());
        assert_eq!(grid.watered_count(), first.len());
    }

    #[test]
    fn full_coverage_reports_fully_watered() {
        let mut grid = WateringGrid::new();
        assert!(!grid.is_fully_watered());
        grid.water(Vec2::ZERO, 100.0);
        assert!(grid.is_fully_watered());
        assert_eq!(grid.progress_percent(), 100);
    }

    #[test]
    fn progress_percent_rounds() {
        let mut grid = WateringGrid::new();
        // a single corner pass waters a small, known-odd fraction
        let changed = grid.water(Vec2::new(-19.0, -19.0), 2.0);
        assert_eq!(changed.len(), 3);
        // 3 / 400 = 0.75% → rounds to 1
        assert_eq!(grid.progress_percent(), 1);
    }

    #[test]
    fn tile_names_follow_row_col_order() {
        assert_eq!(WateringGrid::tile_name(0), "tile_0_0");
        assert_eq!(WateringGrid::tile_name(21), "tile_1_1");
        assert_eq!(WateringGrid::tile_name(399), "tile_19_19");
    }
}
