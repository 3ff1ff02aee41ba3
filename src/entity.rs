use glam::{IVec2, Vec2};

use crate::level::GridMap;
use crate::pathfind::{Movement, PathFinder};
use crate::rng::Rng;
use crate::sprite::octant;

/// Movement per simulation tick, in cells.
pub const MOVE_SPEED: f32 = 0.04;
/// Lookahead distance for collision probing, in cells.
pub const COLLISION_MARGIN: f32 = 0.35;
/// Ticks the hit flash stays up after taking a hit.
pub const HIT_TICKS: u32 = 12;
/// Ticks between contact attacks from one entity.
const ATTACK_COOLDOWN_TICKS: u32 = 45;
/// Ticks the attack animation stays up.
pub const ATTACK_ANIM_TICKS: u32 = 20;
const CONTACT_DAMAGE: i32 = 8;
const TURRET_RANGE: f32 = 6.0;
const TURRET_DAMAGE: i32 = 4;
const TURRET_COOLDOWN_TICKS: u32 = 90;
/// One-in-N chance per tick that a roaming entity pauses.
const PAUSE_ODDS: u32 = 96;
const PAUSE_MIN_TICKS: u32 = 30;
const PAUSE_SPREAD_TICKS: u32 = 60;
/// Walk animation advances every this many movement ticks.
const WALK_CADENCE: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Neutral,
    Enemy,
    Player,
    AmmoBox,
    Turret,
}

impl EntityKind {
    pub fn hostile(self) -> bool {
        matches!(self, EntityKind::Enemy | EntityKind::Turret)
    }

    /// Whether other entities collide with this kind.
    pub fn blocks(self) -> bool {
        !matches!(self, EntityKind::AmmoBox)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Stationary,
    FreeRoaming,
}

pub struct Entity {
    pub kind: EntityKind,
    pub pos: Vec2,
    pub dir: Vec2,
    /// Discrete 8-way facing code derived from `dir`.
    pub facing: u8,
    pub state: AiState,
    pub hitpoints: i32,
    pub walk_frame: usize,
    pub walk_phase: u32,
    pub attack_cooldown: u32,
    pub attack_anim: u32,
    pub hit_timer: u32,
    pub hit: bool,
    pub attacking: bool,
    pub pending_death: bool,
    pub dead: bool,
    pub pause_timer: u32,
    pub waypoints: Vec<IVec2>,
    /// Non-blocking occupant (a pickup) this entity is standing on;
    /// its record is restored when the cell is vacated.
    pub standing_on: Option<EntityKind>,
}

impl Entity {
    pub fn new(kind: EntityKind, pos: Vec2, dir: Vec2) -> Self {
        let hitpoints = match kind {
            EntityKind::Enemy => 30,
            EntityKind::Neutral => 20,
            EntityKind::Turret => 50,
            _ => 10,
        };
        Self {
            kind,
            pos,
            dir: dir.normalize_or_zero(),
            facing: octant(dir),
            state: AiState::Stationary,
            hitpoints,
            walk_frame: 0,
            walk_phase: 0,
            attack_cooldown: 0,
            attack_anim: 0,
            hit_timer: 0,
            hit: false,
            attacking: false,
            pending_death: false,
            dead: false,
            pause_timer: 0,
            waypoints: Vec::new(),
            standing_on: None,
        }
    }

    #[inline]
    pub fn cell(&self) -> IVec2 {
        self.pos.floor().as_ivec2()
    }

    /// Still simulated and rendered. A pending death keeps rendering
    /// until the hit flash finishes, then flips to dead.
    #[inline]
    pub fn renderable(&self) -> bool {
        !self.dead
    }

    fn set_dir(&mut self, dir: Vec2) {
        self.dir = dir.normalize_or_zero();
        self.facing = octant(self.dir);
    }
}

/// Per-cell mirror of live entity positions at integer resolution.
/// Every move clears the old cell and sets the new one; a stale entry
/// would corrupt collision and AI queries.
pub struct OccupancyGrid {
    width: usize,
    height: usize,
    cells: Vec<Option<EntityKind>>,
}

impl OccupancyGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![None; width * height],
        }
    }

    #[inline]
    fn idx(&self, cell: IVec2) -> Option<usize> {
        if cell.x >= 0
            && cell.y >= 0
            && (cell.x as usize) < self.width
            && (cell.y as usize) < self.height
        {
            Some(cell.y as usize * self.width + cell.x as usize)
        } else {
            None
        }
    }

    pub fn get(&self, cell: IVec2) -> Option<EntityKind> {
        self.idx(cell).and_then(|i| self.cells[i])
    }

    pub fn set(&mut self, cell: IVec2, kind: EntityKind) {
        if let Some(i) = self.idx(cell) {
            self.cells[i] = Some(kind);
        }
    }

    /// Clears only when the cell actually records `kind`, so one
    /// entity can never erase another entity's record.
    pub fn clear(&mut self, cell: IVec2, kind: EntityKind) {
        if let Some(i) = self.idx(cell) {
            if self.cells[i] == Some(kind) {
                self.cells[i] = None;
            }
        }
    }
}

/// External hit API: weapon damage lands here. Lethal hits defer death
/// until the hit flash has rendered, but free the occupancy cell at
/// once so collision and AI treat the entity as gone.
pub fn apply_hit(entity: &mut Entity, occupancy: &mut OccupancyGrid, damage: i32) {
    if entity.dead {
        return;
    }
    entity.hitpoints -= damage;
    entity.hit = true;
    entity.hit_timer = HIT_TICKS;
    if entity.hitpoints <= 0 && !entity.pending_death {
        entity.pending_death = true;
        match entity.standing_on.take() {
            Some(kind) => occupancy.set(entity.cell(), kind),
            None => occupancy.clear(entity.cell(), entity.kind),
        }
    }
}

/// Advances all entities one fixed tick: hit timers, full path
/// recompute toward the player, roaming movement with collision
/// resolution, and occupancy upkeep. Runs strictly before rendering,
/// single threaded.
pub struct EntitySimulator {
    rng: Rng,
    pathfinder: PathFinder,
}

impl EntitySimulator {
    pub fn new(seed: u32, movement: Movement) -> Self {
        Self {
            rng: Rng::new(seed),
            pathfinder: PathFinder::new(movement),
        }
    }

    /// Returns the damage dealt to the player this tick.
    pub fn tick(
        &mut self,
        map: &GridMap,
        occupancy: &mut OccupancyGrid,
        entities: &mut [Entity],
        player_pos: Vec2,
    ) -> i32 {
        let player_cell = player_pos.floor().as_ivec2();
        let mut player_damage = 0;

        for e in entities.iter_mut() {
            if e.dead {
                continue;
            }
            if e.hit_timer > 0 {
                e.hit_timer -= 1;
                if e.hit_timer == 0 {
                    e.hit = false;
                    if e.pending_death {
                        e.dead = true;
                        continue;
                    }
                }
            }
            if e.pending_death {
                // Renders the flash for the remaining hit ticks; no AI
                continue;
            }
            if e.attack_cooldown > 0 {
                e.attack_cooldown -= 1;
            }
            if e.attack_anim > 0 {
                e.attack_anim -= 1;
                if e.attack_anim == 0 {
                    e.attacking = false;
                }
            }

            match e.kind {
                EntityKind::Player | EntityKind::AmmoBox => {}
                EntityKind::Turret => {
                    let to_player = player_pos - e.pos;
                    if to_player.length() < TURRET_RANGE
                        && e.attack_cooldown == 0
                        && map.line_of_sight(e.pos, player_pos)
                    {
                        e.set_dir(to_player);
                        e.attacking = true;
                        e.attack_anim = ATTACK_ANIM_TICKS;
                        e.attack_cooldown = TURRET_COOLDOWN_TICKS;
                        player_damage += TURRET_DAMAGE;
                    }
                }
                EntityKind::Enemy | EntityKind::Neutral => {
                    // Full recompute every tick; no route caching
                    let path = self.pathfinder.find(map, e.cell(), player_cell);
                    e.waypoints = path.waypoints;

                    if e.state == AiState::Stationary
                        && map.line_of_sight(e.pos, player_pos)
                    {
                        e.state = AiState::FreeRoaming;
                    }
                    if e.state != AiState::FreeRoaming {
                        continue;
                    }
                    if path.found {
                        if let Some(&next) = e.waypoints.first() {
                            let target = next.as_vec2() + Vec2::splat(0.5);
                            if (target - e.pos).length() > 1e-3 {
                                e.set_dir(target - e.pos);
                            }
                        }
                    }
                    // PathNotFound is not an error; the entity keeps
                    // its heading and roams

                    if e.pause_timer > 0 {
                        e.pause_timer -= 1;
                        continue;
                    }
                    if self.rng.chance(1, PAUSE_ODDS) {
                        e.pause_timer = PAUSE_MIN_TICKS + self.rng.next_range(PAUSE_SPREAD_TICKS);
                        continue;
                    }

                    let next_pos = e.pos + e.dir * MOVE_SPEED;
                    let probe = next_pos + e.dir * COLLISION_MARGIN;
                    let probe_cell = probe.floor().as_ivec2();

                    if map.is_blocking(probe_cell.x, probe_cell.y) {
                        // Undo the move, pick a random left/right turn
                        let quarter = if self.rng.coin() {
                            std::f32::consts::FRAC_PI_2
                        } else {
                            -std::f32::consts::FRAC_PI_2
                        };
                        e.set_dir(Vec2::from_angle(quarter).rotate(e.dir));
                    } else if probe_cell == player_cell {
                        if e.kind.hostile() {
                            if e.attack_cooldown == 0 {
                                e.attacking = true;
                                e.attack_anim = ATTACK_ANIM_TICKS;
                                e.attack_cooldown = ATTACK_COOLDOWN_TICKS;
                                player_damage += CONTACT_DAMAGE;
                            }
                        } else {
                            e.set_dir(-e.dir);
                        }
                    } else if probe_cell != e.cell()
                        && occupancy.get(probe_cell).is_some_and(|k| k.blocks())
                    {
                        // Another blocking entity ahead: turn around
                        e.set_dir(-e.dir);
                    } else {
                        let old_cell = e.cell();
                        let new_cell = next_pos.floor().as_ivec2();
                        // The margin probe leads the position; when the
                        // heading runs nearly parallel to a cell edge the
                        // position itself can cross first, so gate the
                        // actual cell transition too
                        let entry_blocked = new_cell != old_cell
                            && (map.is_blocking(new_cell.x, new_cell.y)
                                || occupancy.get(new_cell).is_some_and(|k| k.blocks()));
                        if entry_blocked {
                            e.set_dir(-e.dir);
                        } else {
                            e.pos = next_pos;
                            if new_cell != old_cell {
                                // Put back whatever non-blocking record
                                // this entity displaced on the way in
                                match e.standing_on.take() {
                                    Some(kind) => occupancy.set(old_cell, kind),
                                    None => occupancy.clear(old_cell, e.kind),
                                }
                                e.standing_on = occupancy.get(new_cell);
                                occupancy.set(new_cell, e.kind);
                            }
                            e.walk_phase += 1;
                            if e.walk_phase >= WALK_CADENCE {
                                e.walk_phase = 0;
                                e.walk_frame = e.walk_frame.wrapping_add(1);
                            }
                        }
                    }
                }
            }
        }
        player_damage
    }
}
