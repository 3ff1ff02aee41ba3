use glam::{IVec2, Vec2};
use tracing::{debug, info};

use crate::camera::Camera;
use crate::entity::{Entity, EntityKind, EntitySimulator, OccupancyGrid, apply_hit};
use crate::level::{ConfigError, GridMap};
use crate::lighting::{Lighting, PointLight, Surface};
use crate::pathfind::Movement;
use crate::sprite;
use crate::texture::{SpriteBank, TextureSet, builtin_sprites, builtin_textures, pack};

pub const WEAPON_DAMAGE: i32 = 10;
const PLAYER_RADIUS: f32 = 0.25;
const PLAYER_START_HEALTH: i32 = 100;
const PLAYER_START_AMMO: u32 = 24;
const PICKUP_AMMO: u32 = 12;

pub struct Player {
    pub health: i32,
    pub ammo: u32,
}

impl Player {
    pub fn alive(&self) -> bool {
        self.health > 0
    }
}

/// The simulation context: every piece of state the subsystems share,
/// passed by reference instead of living in globals. Render passes
/// take it immutably; the tick mutates it on the main thread only.
pub struct World {
    pub map: GridMap,
    pub entities: Vec<Entity>,
    pub occupancy: OccupancyGrid,
    pub lighting: Lighting,
    pub textures: TextureSet,
    pub sprites: SpriteBank,
    pub player: Player,
    player_cell: IVec2,
    simulator: EntitySimulator,
}

impl World {
    pub fn new(
        map: GridMap,
        entities: Vec<Entity>,
        lighting: Lighting,
        textures: TextureSet,
        sprites: SpriteBank,
        player_start: Vec2,
        seed: u32,
    ) -> Result<Self, ConfigError> {
        let max_id = map.max_texture_id();
        if max_id as usize >= textures.len() {
            return Err(ConfigError::TextureIdOutOfRange {
                id: max_id,
                count: textures.len(),
            });
        }
        let mut occupancy = OccupancyGrid::new(map.width(), map.height());
        for e in &entities {
            occupancy.set(e.cell(), e.kind);
        }
        let player_cell = player_start.floor().as_ivec2();
        occupancy.set(player_cell, EntityKind::Player);
        Ok(Self {
            map,
            entities,
            occupancy,
            lighting,
            textures,
            sprites,
            player: Player {
                health: PLAYER_START_HEALTH,
                ammo: PLAYER_START_AMMO,
            },
            player_cell,
            simulator: EntitySimulator::new(seed, Movement::FourWay),
        })
    }

    /// One fixed simulation tick: player occupancy, door animation,
    /// entity AI, pickups. Strictly before any rendering.
    pub fn tick(&mut self, player_pos: Vec2) {
        let cell = player_pos.floor().as_ivec2();
        if cell != self.player_cell {
            self.occupancy.clear(self.player_cell, EntityKind::Player);
            self.occupancy.set(cell, EntityKind::Player);
            self.player_cell = cell;
        }

        let occupancy = &self.occupancy;
        self.map
            .tick_doors(|c| c == cell || occupancy.get(c).is_some());

        let damage = self.simulator.tick(
            &self.map,
            &mut self.occupancy,
            &mut self.entities,
            player_pos,
        );
        if damage > 0 {
            self.player.health = (self.player.health - damage).max(0);
            debug!(damage, health = self.player.health, "player took damage");
        }

        for e in &mut self.entities {
            if e.kind == EntityKind::AmmoBox && !e.dead && !e.pending_death && e.cell() == cell {
                e.dead = true;
                self.occupancy.clear(e.cell(), e.kind);
                self.player.ammo += PICKUP_AMMO;
                debug!(ammo = self.player.ammo, "picked up ammo");
            }
        }
    }

    /// Move the player with axis-separated sliding against walls,
    /// closed doors and blocking entities.
    pub fn slide_move(&self, pos: Vec2, delta: Vec2) -> Vec2 {
        let mut out = pos;
        let nx = out.x + delta.x;
        if delta.x != 0.0 && !self.blocked(nx + PLAYER_RADIUS.copysign(delta.x), out.y) {
            out.x = nx;
        }
        let ny = out.y + delta.y;
        if delta.y != 0.0 && !self.blocked(out.x, ny + PLAYER_RADIUS.copysign(delta.y)) {
            out.y = ny;
        }
        out
    }

    fn blocked(&self, x: f32, y: f32) -> bool {
        let cell = Vec2::new(x, y).floor().as_ivec2();
        if self.map.is_blocking(cell.x, cell.y) {
            return true;
        }
        matches!(
            self.occupancy.get(cell),
            Some(k) if k.blocks() && k != EntityKind::Player
        )
    }

    /// Open the door in front of the camera, if any.
    pub fn use_door(&mut self, camera: &Camera) {
        let ahead = (camera.pos + camera.dir).floor().as_ivec2();
        self.map.request_open(ahead);
    }

    /// Weapon hit-scan, the external collaborator of the depth buffer:
    /// walk entities front to back, take the first whose sprite spans
    /// the center column nearer than the wall there. Returns true if a
    /// shot was fired.
    pub fn fire(&mut self, camera: &Camera, depth: &[f32], width: usize, height: usize) -> bool {
        if self.player.ammo == 0 {
            return false;
        }
        self.player.ammo -= 1;
        let center = width / 2;
        for index in sprite::hit_order(&self.entities, camera.pos) {
            let cam_space = sprite::to_camera_space(camera, self.entities[index].pos);
            if cam_space.y <= 0.05 || cam_space.y >= depth[center] {
                continue;
            }
            let screen_x = (width as f32 / 2.0) * (1.0 + cam_space.x / cam_space.y);
            let half = 0.5 * height as f32 / cam_space.y;
            if (screen_x - center as f32).abs() <= half {
                apply_hit(
                    &mut self.entities[index],
                    &mut self.occupancy,
                    WEAPON_DAMAGE,
                );
                break;
            }
        }
        true
    }

    /// Built-in demo level so the engine runs without external assets.
    /// Returns the world and the player spawn position.
    pub fn demo(seed: u32) -> Result<(Self, Vec2), ConfigError> {
        const ROWS: [&str; 16] = [
            "######################",
            "#....#...............#",
            "#....#..e.....a......#",
            "#....D.......###+###.#",
            "#....#.......#.....#.#",
            "#@...#.......#..t..#.#",
            "#....#.......#.....#.#",
            "#....#.......###D###.#",
            "#.a..#...............#",
            "#....##%%##......n...#",
            "#.........%..........#",
            "#....e....%..........#",
            "#.........%....e.....#",
            "##%%%%....%......a...#",
            "#.........%..........#",
            "######################",
        ];
        let height = ROWS.len();
        let width = ROWS[0].len();
        let mut wall = vec![0u8; width * height];
        let mut door = vec![0u8; width * height];
        let mut entities = Vec::new();
        let mut player_start = Vec2::new(1.5, 1.5);
        for (y, row) in ROWS.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                let i = y * width + x;
                let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                match c {
                    '#' => wall[i] = 1,
                    '%' => wall[i] = 2,
                    '+' => wall[i] = 3,
                    'D' => door[i] = 4,
                    '@' => player_start = center,
                    'e' => entities.push(Entity::new(EntityKind::Enemy, center, Vec2::X)),
                    'n' => entities.push(Entity::new(EntityKind::Neutral, center, Vec2::Y)),
                    't' => entities.push(Entity::new(EntityKind::Turret, center, -Vec2::X)),
                    'a' => entities.push(Entity::new(EntityKind::AmmoBox, center, Vec2::X)),
                    _ => {}
                }
            }
        }
        let map = GridMap::new(
            width,
            height,
            vec![5; width * height],
            wall,
            vec![6; width * height],
            door,
        )?;
        let lighting = Lighting {
            enabled: true,
            fog_distance: 14.0,
            lights: vec![
                PointLight {
                    pos: Vec2::new(16.5, 5.5),
                    surface: Surface::Wall,
                    radius: 5.0,
                    intensity: 0.8,
                    color: pack(255, 170, 110),
                },
                PointLight {
                    pos: Vec2::new(16.5, 5.5),
                    surface: Surface::Floor,
                    radius: 4.0,
                    intensity: 0.6,
                    color: pack(255, 170, 110),
                },
                PointLight {
                    pos: player_start,
                    surface: Surface::Floor,
                    radius: 6.0,
                    intensity: 0.5,
                    color: pack(170, 200, 255),
                },
                PointLight {
                    pos: Vec2::new(10.5, 10.5),
                    surface: Surface::Ceiling,
                    radius: 6.0,
                    intensity: 0.7,
                    color: pack(200, 220, 255),
                },
            ],
        };
        let textures = builtin_textures(64)?;
        let sprites = builtin_sprites();
        let entity_count = entities.len();
        let world = Self::new(
            map,
            entities,
            lighting,
            textures,
            sprites,
            player_start,
            seed,
        )?;
        info!(width, height, entity_count, "demo level ready");
        Ok((world, player_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::AiState;

    #[test]
    fn demo_level_builds() {
        let (world, start) = World::demo(1).unwrap();
        assert!(world.entities.len() >= 6);
        assert!(!world.map.is_blocking(start.x as i32, start.y as i32));
        assert_eq!(
            world.occupancy.get(start.floor().as_ivec2()),
            Some(EntityKind::Player)
        );
    }

    fn tiny_world(entities: Vec<Entity>, player_start: Vec2) -> World {
        let n = 8;
        let mut wall = vec![0u8; n * n];
        for y in 0..n {
            for x in 0..n {
                if x == 0 || y == 0 || x == n - 1 || y == n - 1 {
                    wall[y * n + x] = 1;
                }
            }
        }
        let map = GridMap::new(n, n, vec![5; n * n], wall, vec![6; n * n], vec![0; n * n])
            .unwrap();
        World::new(
            map,
            entities,
            Lighting::unlit(),
            crate::texture::builtin_textures(16).unwrap(),
            crate::texture::builtin_sprites(),
            player_start,
            99,
        )
        .unwrap()
    }

    #[test]
    fn fire_damages_the_entity_under_the_crosshair() {
        let mut world = tiny_world(
            vec![Entity::new(EntityKind::Enemy, Vec2::new(4.5, 2.5), Vec2::X)],
            Vec2::new(1.5, 2.5),
        );
        let camera = Camera::new(Vec2::new(1.5, 2.5), 0.0, 66.0);
        let depth = vec![100.0f32; 64];
        let before = world.entities[0].hitpoints;
        assert!(world.fire(&camera, &depth, 64, 48));
        assert_eq!(world.entities[0].hitpoints, before - WEAPON_DAMAGE);
        assert!(world.entities[0].hit);
        assert_eq!(world.player.ammo, PLAYER_START_AMMO - 1);
    }

    #[test]
    fn fire_respects_wall_occlusion() {
        let mut world = tiny_world(
            vec![Entity::new(EntityKind::Enemy, Vec2::new(4.5, 2.5), Vec2::X)],
            Vec2::new(1.5, 2.5),
        );
        let camera = Camera::new(Vec2::new(1.5, 2.5), 0.0, 66.0);
        // Wall at depth 1.0 occludes the entity at depth 3.0
        let depth = vec![1.0f32; 64];
        world.fire(&camera, &depth, 64, 48);
        assert!(!world.entities[0].hit);
    }

    #[test]
    fn ammo_box_is_picked_up_on_contact() {
        let mut world = tiny_world(
            vec![Entity::new(EntityKind::AmmoBox, Vec2::new(3.5, 3.5), Vec2::X)],
            Vec2::new(1.5, 1.5),
        );
        let ammo_before = world.player.ammo;
        world.tick(Vec2::new(3.5, 3.5));
        assert!(world.entities[0].dead);
        assert_eq!(world.player.ammo, ammo_before + PICKUP_AMMO);
        assert_eq!(world.occupancy.get(IVec2::new(3, 3)), Some(EntityKind::Player));
    }

    #[test]
    fn slide_move_blocks_on_walls_but_slides_along_them() {
        let world = tiny_world(Vec::new(), Vec2::new(1.5, 1.5));
        // Pushing diagonally into the west wall keeps the x clamp but
        // lets y advance
        let out = world.slide_move(Vec2::new(1.4, 2.5), Vec2::new(-0.3, 0.2));
        assert_eq!(out.x, 1.4);
        assert!((out.y - 2.7).abs() < 1e-6);
    }

    #[test]
    fn roaming_entity_never_enters_the_player_cell() {
        let mut world = tiny_world(
            vec![Entity::new(EntityKind::Enemy, Vec2::new(5.5, 5.5), Vec2::X)],
            Vec2::new(2.5, 2.5),
        );
        world.entities[0].state = AiState::FreeRoaming;
        let player_pos = Vec2::new(2.5, 2.5);
        for _ in 0..3000 {
            world.tick(player_pos);
            assert_ne!(world.entities[0].cell(), player_pos.floor().as_ivec2());
        }
    }
}
