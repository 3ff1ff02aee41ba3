use glam::{IVec2, Vec2};
use thiserror::Error;

/// Open fraction at which a ray (and an entity) passes through a door cell.
pub const DOOR_PASSABLE: f32 = 0.9;
/// Open-fraction change per simulation tick.
const DOOR_SPEED: f32 = 0.05;
/// Ticks a fully open door holds before it starts closing.
const DOOR_HOLD_TICKS: u32 = 180;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("level must be at least 3x3 cells, got {width}x{height}")]
    LevelTooSmall { width: usize, height: usize },
    #[error("level layer has {got} cells, expected {expected}")]
    LayerSizeMismatch { expected: usize, got: usize },
    #[error("level boundary at ({x}, {y}) must be solid wall")]
    OpenBoundary { x: usize, y: usize },
    #[error("door at ({x}, {y}) overlaps a wall cell")]
    DoorInsideWall { x: usize, y: usize },
    #[error("texture {index} must be square with power-of-two side, got {width}x{height}")]
    BadTextureShape {
        index: usize,
        width: usize,
        height: usize,
    },
    #[error("level references texture id {id} but only {count} textures are loaded")]
    TextureIdOutOfRange { id: u8, count: usize },
}

/// A wall-layer cell resolved together with door state. Rays match on
/// this instead of poking the raw layers, so door traversal never has
/// to mutate the shared grid mid-trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Empty,
    Wall(u8),
    Door { tex: u8, open: f32 },
}

#[derive(Debug, Clone, Copy)]
struct DoorState {
    cell: usize,
    open: f32,
    opening: bool,
    hold: u32,
}

/// Static level grid: four parallel integer layers plus door state.
/// The layers are immutable after load; only door open fractions move,
/// and only from the single-threaded simulation step.
pub struct GridMap {
    width: usize,
    height: usize,
    floor: Vec<u8>,
    wall: Vec<u8>,
    ceiling: Vec<u8>,
    door: Vec<u8>,
    doors: Vec<DoorState>,
}

impl GridMap {
    pub fn new(
        width: usize,
        height: usize,
        floor: Vec<u8>,
        wall: Vec<u8>,
        ceiling: Vec<u8>,
        door: Vec<u8>,
    ) -> Result<Self, ConfigError> {
        if width < 3 || height < 3 {
            return Err(ConfigError::LevelTooSmall { width, height });
        }
        let expected = width * height;
        for layer in [&floor, &wall, &ceiling, &door] {
            if layer.len() != expected {
                return Err(ConfigError::LayerSizeMismatch {
                    expected,
                    got: layer.len(),
                });
            }
        }
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                let edge = x == 0 || y == 0 || x == width - 1 || y == height - 1;
                if edge && wall[i] == 0 {
                    return Err(ConfigError::OpenBoundary { x, y });
                }
                if door[i] != 0 && wall[i] != 0 {
                    return Err(ConfigError::DoorInsideWall { x, y });
                }
            }
        }
        let doors = door
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d != 0)
            .map(|(cell, _)| DoorState {
                cell,
                open: 0.0,
                opening: false,
                hold: 0,
            })
            .collect();
        Ok(Self {
            width,
            height,
            floor,
            wall,
            ceiling,
            door,
            doors,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline]
    fn idx(&self, x: i32, y: i32) -> usize {
        y as usize * self.width + x as usize
    }

    /// Resolve the wall layer and door state at a cell. Out-of-bounds
    /// reads resolve to solid wall so a ray can never escape the map.
    pub fn cell(&self, x: i32, y: i32) -> Cell {
        if !self.in_bounds(x, y) {
            return Cell::Wall(1);
        }
        let i = self.idx(x, y);
        if self.wall[i] != 0 {
            Cell::Wall(self.wall[i])
        } else if self.door[i] != 0 {
            Cell::Door {
                tex: self.door[i],
                open: self.door_open(i),
            }
        } else {
            Cell::Empty
        }
    }

    fn door_open(&self, cell: usize) -> f32 {
        self.doors
            .iter()
            .find(|d| d.cell == cell)
            .map(|d| d.open)
            .unwrap_or(0.0)
    }

    /// True when the cell stops movement: wall, or door not yet open.
    pub fn is_blocking(&self, x: i32, y: i32) -> bool {
        match self.cell(x, y) {
            Cell::Empty => false,
            Cell::Wall(_) => true,
            Cell::Door { open, .. } => open < DOOR_PASSABLE,
        }
    }

    /// Walkable for pathfinding: only the wall layer counts, doors are
    /// traversable edges that an entity may have to wait on.
    #[inline]
    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && self.wall[self.idx(x, y)] == 0
    }

    #[inline]
    pub fn floor_id(&self, x: i32, y: i32) -> u8 {
        if self.in_bounds(x, y) {
            self.floor[self.idx(x, y)]
        } else {
            0
        }
    }

    #[inline]
    pub fn ceiling_id(&self, x: i32, y: i32) -> u8 {
        if self.in_bounds(x, y) {
            self.ceiling[self.idx(x, y)]
        } else {
            0
        }
    }

    pub fn max_texture_id(&self) -> u8 {
        let layers = [&self.floor, &self.wall, &self.ceiling, &self.door];
        layers
            .iter()
            .flat_map(|l| l.iter().copied())
            .max()
            .unwrap_or(0)
    }

    /// Start opening the door at a cell, if there is one.
    pub fn request_open(&mut self, cell: IVec2) {
        if !self.in_bounds(cell.x, cell.y) {
            return;
        }
        let i = self.idx(cell.x, cell.y);
        if let Some(door) = self.doors.iter_mut().find(|d| d.cell == i) {
            door.opening = true;
        }
    }

    /// Advance door animation one tick. `occupied` reports whether any
    /// entity or the player stands in the given cell; a door never
    /// closes on an occupant.
    pub fn tick_doors(&mut self, occupied: impl Fn(IVec2) -> bool) {
        let width = self.width;
        for door in &mut self.doors {
            if door.opening {
                door.open = (door.open + DOOR_SPEED).min(1.0);
                if door.open >= 1.0 {
                    door.opening = false;
                    door.hold = DOOR_HOLD_TICKS;
                }
            } else if door.hold > 0 {
                door.hold -= 1;
            } else if door.open > 0.0 {
                let cell = IVec2::new((door.cell % width) as i32, (door.cell / width) as i32);
                if occupied(cell) {
                    // Re-arm the hold timer until the doorway clears
                    door.hold = DOOR_HOLD_TICKS / 6;
                } else {
                    door.open = (door.open - DOOR_SPEED).max(0.0);
                }
            }
        }
    }

    /// Straight-line visibility between two points, stepping the grid
    /// with the same DDA the renderer uses. Closed doors block sight.
    pub fn line_of_sight(&self, from: Vec2, to: Vec2) -> bool {
        let delta = to - from;
        let dist = delta.length();
        if dist < 1e-4 {
            return true;
        }
        let ray = delta / dist;
        let mut map_x = from.x.floor() as i32;
        let mut map_y = from.y.floor() as i32;
        let target_x = to.x.floor() as i32;
        let target_y = to.y.floor() as i32;
        let delta_dist_x = if ray.x == 0.0 { f32::INFINITY } else { (1.0 / ray.x).abs() };
        let delta_dist_y = if ray.y == 0.0 { f32::INFINITY } else { (1.0 / ray.y).abs() };
        let step_x: i32 = if ray.x < 0.0 { -1 } else { 1 };
        let step_y: i32 = if ray.y < 0.0 { -1 } else { 1 };
        let mut side_dist_x = if ray.x < 0.0 {
            (from.x - map_x as f32) * delta_dist_x
        } else {
            (map_x as f32 + 1.0 - from.x) * delta_dist_x
        };
        let mut side_dist_y = if ray.y < 0.0 {
            (from.y - map_y as f32) * delta_dist_y
        } else {
            (map_y as f32 + 1.0 - from.y) * delta_dist_y
        };
        loop {
            if map_x == target_x && map_y == target_y {
                return true;
            }
            let travelled = side_dist_x.min(side_dist_y);
            if travelled > dist {
                return true;
            }
            if side_dist_x < side_dist_y {
                side_dist_x += delta_dist_x;
                map_x += step_x;
            } else {
                side_dist_y += delta_dist_y;
                map_y += step_y;
            }
            match self.cell(map_x, map_y) {
                Cell::Empty => {}
                Cell::Wall(_) => return false,
                Cell::Door { open, .. } => {
                    if open < DOOR_PASSABLE {
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn boxed_map(width: usize, height: usize) -> GridMap {
        let mut wall = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                    wall[y * width + x] = 1;
                }
            }
        }
        GridMap::new(
            width,
            height,
            vec![1; width * height],
            wall,
            vec![1; width * height],
            vec![0; width * height],
        )
        .unwrap()
    }

    #[test]
    fn rejects_open_boundary() {
        let n = 5;
        let result = GridMap::new(
            n,
            n,
            vec![0; n * n],
            vec![0; n * n],
            vec![0; n * n],
            vec![0; n * n],
        );
        assert!(matches!(result, Err(ConfigError::OpenBoundary { .. })));
    }

    #[test]
    fn rejects_mismatched_layers() {
        let result = GridMap::new(4, 4, vec![0; 16], vec![1; 16], vec![0; 16], vec![0; 15]);
        assert!(matches!(result, Err(ConfigError::LayerSizeMismatch { .. })));
    }

    #[test]
    fn out_of_bounds_resolves_to_wall() {
        let map = boxed_map(6, 6);
        assert!(matches!(map.cell(-1, 2), Cell::Wall(_)));
        assert!(matches!(map.cell(2, 99), Cell::Wall(_)));
    }

    #[test]
    fn door_opens_holds_and_closes() {
        let n = 5;
        let mut wall = vec![0u8; n * n];
        for y in 0..n {
            for x in 0..n {
                if x == 0 || y == 0 || x == n - 1 || y == n - 1 {
                    wall[y * n + x] = 1;
                }
            }
        }
        let mut door = vec![0u8; n * n];
        door[2 * n + 2] = 3;
        let mut map =
            GridMap::new(n, n, vec![1; n * n], wall, vec![1; n * n], door).unwrap();

        assert!(map.is_blocking(2, 2));
        map.request_open(IVec2::new(2, 2));
        for _ in 0..100 {
            map.tick_doors(|_| false);
        }
        assert!(!map.is_blocking(2, 2));

        // Drain the hold timer plus the closing sweep
        for _ in 0..400 {
            map.tick_doors(|_| false);
        }
        assert!(map.is_blocking(2, 2));
    }

    #[test]
    fn door_never_closes_on_occupant() {
        let n = 5;
        let mut wall = vec![0u8; n * n];
        for y in 0..n {
            for x in 0..n {
                if x == 0 || y == 0 || x == n - 1 || y == n - 1 {
                    wall[y * n + x] = 1;
                }
            }
        }
        let mut door = vec![0u8; n * n];
        door[2 * n + 2] = 3;
        let mut map =
            GridMap::new(n, n, vec![1; n * n], wall, vec![1; n * n], door).unwrap();
        map.request_open(IVec2::new(2, 2));
        for _ in 0..2000 {
            map.tick_doors(|cell| cell == IVec2::new(2, 2));
        }
        assert!(!map.is_blocking(2, 2));
    }

    #[test]
    fn line_of_sight_blocked_by_wall() {
        let mut map = boxed_map(8, 8);
        // Drop a pillar between the two probe points
        map.wall[3 * 8 + 3] = 2;
        assert!(!map.line_of_sight(Vec2::new(1.5, 3.5), Vec2::new(6.5, 3.5)));
        assert!(map.line_of_sight(Vec2::new(1.5, 1.5), Vec2::new(6.5, 1.5)));
    }
}
