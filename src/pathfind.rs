use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::IVec2;

use crate::level::GridMap;

/// Neighbor model for the search graph. Diagonal movement switches the
/// heuristic from Manhattan to Chebyshev distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    FourWay,
    EightWay,
}

/// Outcome of one search. "No path" is a legitimate result, not an
/// error: `found` is false and the waypoint list is empty.
pub struct PathResult {
    pub found: bool,
    /// Ordered cells from start (exclusive) to goal (inclusive).
    pub waypoints: Vec<IVec2>,
}

impl PathResult {
    fn not_found() -> Self {
        Self {
            found: false,
            waypoints: Vec::new(),
        }
    }
}

#[derive(PartialEq, Eq)]
struct Node {
    f: u32,
    g: u32,
    cell: u32,
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f; ties break on the lower cell index so
        // identical inputs always expand in the same order.
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const NO_PREV: u32 = u32::MAX;

// Cardinals first, in fixed order, then diagonals
const NEIGHBORS: [(i32, i32); 8] = [
    (0, -1),
    (1, 0),
    (0, 1),
    (-1, 0),
    (1, -1),
    (1, 1),
    (-1, 1),
    (-1, -1),
];

/// A* over the wall layer with unit edge weights. The scratch arrays
/// are kept between searches since every pathfinding entity triggers a
/// fresh search each tick.
pub struct PathFinder {
    movement: Movement,
    g: Vec<u32>,
    prev: Vec<u32>,
    open: BinaryHeap<Node>,
}

impl PathFinder {
    pub fn new(movement: Movement) -> Self {
        Self {
            movement,
            g: Vec::new(),
            prev: Vec::new(),
            open: BinaryHeap::new(),
        }
    }

    pub fn find(&mut self, map: &GridMap, start: IVec2, goal: IVec2) -> PathResult {
        if !map.is_walkable(start.x, start.y) || !map.is_walkable(goal.x, goal.y) {
            return PathResult::not_found();
        }
        if start == goal {
            return PathResult {
                found: true,
                waypoints: Vec::new(),
            };
        }

        let width = map.width() as i32;
        let cells = map.width() * map.height();
        self.g.clear();
        self.g.resize(cells, u32::MAX);
        self.prev.clear();
        self.prev.resize(cells, NO_PREV);
        self.open.clear();

        let movement = self.movement;
        let index = |c: IVec2| (c.y * width + c.x) as u32;
        let coords = |i: u32| IVec2::new(i as i32 % width, i as i32 / width);
        let heuristic = move |c: IVec2| {
            let dx = (c.x - goal.x).unsigned_abs();
            let dy = (c.y - goal.y).unsigned_abs();
            match movement {
                Movement::FourWay => dx + dy,
                Movement::EightWay => dx.max(dy),
            }
        };

        let start_i = index(start);
        let goal_i = index(goal);
        self.g[start_i as usize] = 0;
        self.open.push(Node {
            f: heuristic(start),
            g: 0,
            cell: start_i,
        });

        let neighbor_count = match self.movement {
            Movement::FourWay => 4,
            Movement::EightWay => 8,
        };

        while let Some(node) = self.open.pop() {
            if node.g > self.g[node.cell as usize] {
                continue; // stale entry, a cheaper route got there first
            }
            if node.cell == goal_i {
                return self.reconstruct(goal_i, start_i, coords);
            }
            let here = coords(node.cell);
            for &(dx, dy) in &NEIGHBORS[..neighbor_count] {
                let next = IVec2::new(here.x + dx, here.y + dy);
                if !map.is_walkable(next.x, next.y) {
                    continue;
                }
                // Diagonal steps must not cut a wall corner
                if dx != 0
                    && dy != 0
                    && (!map.is_walkable(here.x + dx, here.y)
                        || !map.is_walkable(here.x, here.y + dy))
                {
                    continue;
                }
                let next_i = index(next);
                let next_g = node.g + 1;
                if next_g < self.g[next_i as usize] {
                    self.g[next_i as usize] = next_g;
                    self.prev[next_i as usize] = node.cell;
                    self.open.push(Node {
                        f: next_g + heuristic(next),
                        g: next_g,
                        cell: next_i,
                    });
                }
            }
        }
        PathResult::not_found()
    }

    fn reconstruct(&self, goal: u32, start: u32, coords: impl Fn(u32) -> IVec2) -> PathResult {
        let mut waypoints = Vec::new();
        let mut cell = goal;
        while cell != start {
            waypoints.push(coords(cell));
            cell = self.prev[cell as usize];
        }
        waypoints.reverse();
        PathResult {
            found: true,
            waypoints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::GridMap;

    fn map_from_rows(rows: &[&str]) -> GridMap {
        let height = rows.len();
        let width = rows[0].len();
        let mut wall = Vec::with_capacity(width * height);
        for row in rows {
            for c in row.chars() {
                wall.push(if c == '#' { 1u8 } else { 0u8 });
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
    fn start_equals_goal_is_found_with_empty_path() {
        let map = map_from_rows(&["#####", "#...#", "#...#", "#...#", "#####"]);
        let mut pf = PathFinder::new(Movement::FourWay);
        let r = pf.find(&map, IVec2::new(2, 2), IVec2::new(2, 2));
        assert!(r.found);
        assert!(r.waypoints.is_empty());
    }

    #[test]
    fn walled_off_goal_reports_not_found_with_empty_path() {
        // (3,2) is enclosed on all four sides
        let map = map_from_rows(&["#######", "#.###.#", "#.#.#.#", "#.###.#", "#######"]);
        let mut pf = PathFinder::new(Movement::FourWay);
        let r = pf.find(&map, IVec2::new(1, 1), IVec2::new(3, 2));
        assert!(!r.found);
        assert!(r.waypoints.is_empty());
    }

    #[test]
    fn straight_corridor_path_is_cell_by_cell() {
        let map = map_from_rows(&["#####", "#...#", "#####"]);
        let mut pf = PathFinder::new(Movement::FourWay);
        let r = pf.find(&map, IVec2::new(1, 1), IVec2::new(3, 1));
        assert!(r.found);
        assert_eq!(r.waypoints, vec![IVec2::new(2, 1), IVec2::new(3, 1)]);
    }

    #[test]
    fn path_length_matches_manhattan_distance_on_open_grid() {
        let map = map_from_rows(&[
            "########",
            "#......#",
            "#......#",
            "#......#",
            "#......#",
            "########",
        ]);
        let mut pf = PathFinder::new(Movement::FourWay);
        let r = pf.find(&map, IVec2::new(1, 1), IVec2::new(6, 4));
        assert!(r.found);
        assert_eq!(r.waypoints.len(), 5 + 3);
        assert_eq!(*r.waypoints.last().unwrap(), IVec2::new(6, 4));
    }

    #[test]
    fn eight_way_uses_diagonals_without_corner_cutting() {
        let map = map_from_rows(&[
            "######",
            "#....#",
            "#.##.#",
            "#....#",
            "######",
        ]);
        let mut pf = PathFinder::new(Movement::EightWay);
        let r = pf.find(&map, IVec2::new(1, 1), IVec2::new(4, 3));
        assert!(r.found);
        // A diagonal may never pass between two touching wall corners
        for pair in r.waypoints.windows(2) {
            let step = pair[1] - pair[0];
            if step.x != 0 && step.y != 0 {
                assert!(map.is_walkable(pair[0].x + step.x, pair[0].y));
                assert!(map.is_walkable(pair[0].x, pair[0].y + step.y));
            }
        }
    }

    #[test]
    fn tie_breaking_is_deterministic_across_runs() {
        let map = map_from_rows(&[
            "#########",
            "#.......#",
            "#.#.#.#.#",
            "#.......#",
            "#.#.#.#.#",
            "#.......#",
            "#########",
        ]);
        let mut pf = PathFinder::new(Movement::FourWay);
        let first = pf.find(&map, IVec2::new(1, 1), IVec2::new(7, 5)).waypoints;
        for _ in 0..10 {
            let again = pf.find(&map, IVec2::new(1, 1), IVec2::new(7, 5)).waypoints;
            assert_eq!(first, again);
        }
    }
}
