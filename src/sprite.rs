use glam::Vec2;

use crate::camera::Camera;
use crate::entity::{Entity, EntityKind};
use crate::lighting::{Lighting, Surface};
use crate::texture::{SpriteBank, SpriteBundle, Texture, is_transparent, pack};

/// Sprites behind this camera-space depth are dropped outright.
const NEAR: f32 = 0.05;

/// Fixed recolor for entities in their hit-flash state; lighting does
/// not apply to it.
pub const ALERT_TINT: u32 = pack(230, 40, 40);

const DIAG: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// The 8 view directions, counterclockwise from +X in grid space.
/// Built from axis units and the two diagonal constants only.
pub const DIRECTIONS_8: [Vec2; 8] = [
    Vec2::new(1.0, 0.0),
    Vec2::new(DIAG, DIAG),
    Vec2::new(0.0, 1.0),
    Vec2::new(-DIAG, DIAG),
    Vec2::new(-1.0, 0.0),
    Vec2::new(-DIAG, -DIAG),
    Vec2::new(0.0, -1.0),
    Vec2::new(DIAG, -DIAG),
];

/// Octant of a direction vector: a single max-selection over the
/// precomputed table, no inverse trigonometry. Ties resolve to the
/// lower index, so the result is deterministic.
pub fn octant(v: Vec2) -> u8 {
    let mut best = 0u8;
    let mut best_dot = f32::NEG_INFINITY;
    for (i, d) in DIRECTIONS_8.iter().enumerate() {
        let dot = v.x * d.x + v.y * d.y;
        if dot > best_dot {
            best_dot = dot;
            best = i as u8;
        }
    }
    best
}

fn bundle_for(bank: &SpriteBank, kind: EntityKind) -> &SpriteBundle {
    match kind {
        EntityKind::Enemy => &bank.enemy,
        EntityKind::Neutral | EntityKind::Player => &bank.neutral,
        EntityKind::Turret => &bank.turret,
        EntityKind::AmmoBox => &bank.ammo,
    }
}

/// Pick the frame for one entity as seen from the camera: the view
/// octant of the entity-to-camera vector, rotated by the entity's own
/// facing, indexes the 8 directional walk strips.
fn select_frame<'a>(bundle: &'a SpriteBundle, entity: &Entity, cam_pos: Vec2) -> &'a Texture {
    if entity.pending_death {
        let frames = &bundle.death;
        let step = (crate::entity::HIT_TICKS - entity.hit_timer.min(crate::entity::HIT_TICKS))
            as usize
            * frames.len()
            / crate::entity::HIT_TICKS as usize;
        return &frames[step.min(frames.len() - 1)];
    }
    if entity.attacking && !bundle.attack.is_empty() {
        // Step the sequence off the countdown, like death frames
        let total = crate::entity::ATTACK_ANIM_TICKS;
        let step = (total - entity.attack_anim.min(total)) as usize * bundle.attack.len()
            / total as usize;
        return &bundle.attack[step.min(bundle.attack.len() - 1)];
    }
    let view = octant(cam_pos - entity.pos);
    let rel = (view + 8 - entity.facing) & 7;
    let strip = &bundle.walk[rel as usize];
    &strip[entity.walk_frame % strip.len()]
}

struct Projected {
    index: usize,
    depth: f32,
}

fn project_order(entities: &[Entity], cam_pos: Vec2) -> Vec<Projected> {
    let mut order: Vec<Projected> = entities
        .iter()
        .enumerate()
        .filter(|(_, e)| e.renderable() && e.kind != EntityKind::Player)
        .map(|(index, e)| Projected {
            index,
            depth: (e.pos - cam_pos).length_squared(),
        })
        .collect();
    // Back to front; equal depths keep index order so compositing is
    // reproducible
    order.sort_by(|a, b| {
        b.depth
            .partial_cmp(&a.depth)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    order
}

/// Entity indices front to back, for the external weapon hit-scan.
pub fn hit_order(entities: &[Entity], cam_pos: Vec2) -> Vec<usize> {
    let mut order = project_order(entities, cam_pos);
    order.reverse();
    order.into_iter().map(|p| p.index).collect()
}

/// Camera-space position of a world point: x is the screen-plane
/// offset, y the transformed depth compared against the depth buffer.
pub fn to_camera_space(camera: &Camera, world: Vec2) -> Vec2 {
    let rel = world - camera.pos;
    let inv = camera.inv_det();
    Vec2::new(
        inv * (camera.dir.y * rel.x - camera.dir.x * rel.y),
        inv * (-camera.plane.y * rel.x + camera.plane.x * rel.y),
    )
}

/// Composite every live entity into the frame, back to front, testing
/// each column against the wall depth buffer. Runs on the calling
/// thread after the banded surface pass has joined.
pub fn composite(
    fb: &mut [u32],
    depth: &[f32],
    width: usize,
    height: usize,
    camera: &Camera,
    entities: &[Entity],
    bank: &SpriteBank,
    lighting: &Lighting,
) {
    let pitch_px = camera.pitch_pixels(height);
    for p in project_order(entities, camera.pos) {
        let entity = &entities[p.index];
        let cam_space = to_camera_space(camera, entity.pos);
        if cam_space.y <= NEAR {
            continue;
        }
        let screen_x = (width as f32 / 2.0) * (1.0 + cam_space.x / cam_space.y);
        let sprite_size = (height as f32 / cam_space.y).abs();
        let half = sprite_size / 2.0;
        let center_y = height as f32 / 2.0 + pitch_px;

        let x0 = (screen_x - half).floor().max(0.0) as usize;
        let x1 = ((screen_x + half).ceil() as usize).min(width);
        let y0 = (center_y - half).floor().max(0.0) as usize;
        let y1 = ((center_y + half).ceil() as usize).min(height);
        if x0 >= x1 || y0 >= y1 {
            continue;
        }

        let texture = select_frame(bundle_for(bank, entity.kind), entity, camera.pos);
        let tex_size = texture.size() as f32;

        for x in x0..x1 {
            // Strictly nearer than the wall in this column, or skip
            if cam_space.y >= depth[x] {
                continue;
            }
            let u = (x as f32 - (screen_x - half)) / sprite_size;
            let tex_x = (u * tex_size) as usize;
            for y in y0..y1 {
                let v = (y as f32 - (center_y - half)) / sprite_size;
                let tex_y = (v * tex_size) as usize;
                let texel = texture.texel(tex_x, tex_y);
                if is_transparent(texel) {
                    continue;
                }
                fb[y * width + x] = if entity.hit {
                    ALERT_TINT
                } else {
                    lighting.shade(texel, entity.pos, cam_space.y, Surface::Wall)
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::builtin_sprites;

    #[test]
    fn octants_map_the_cardinal_and_diagonal_directions() {
        assert_eq!(octant(Vec2::new(1.0, 0.0)), 0);
        assert_eq!(octant(Vec2::new(2.0, 2.0)), 1);
        assert_eq!(octant(Vec2::new(0.0, 3.0)), 2);
        assert_eq!(octant(Vec2::new(-1.0, 0.0)), 4);
        assert_eq!(octant(Vec2::new(0.0, -1.0)), 6);
        assert_eq!(octant(Vec2::new(0.5, -0.5)), 7);
    }

    #[test]
    fn occluded_entity_contributes_zero_pixels() {
        let camera = Camera::new(Vec2::new(2.0, 2.0), 0.0, 66.0);
        let mut entities = vec![Entity::new(
            EntityKind::Enemy,
            Vec2::new(6.0, 2.0),
            Vec2::X,
        )];
        entities[0].state = crate::entity::AiState::FreeRoaming;
        let (width, height) = (64usize, 48usize);
        // Wall everywhere at depth 1.0: the entity at depth 4 is
        // occluded in every column
        let depth = vec![1.0f32; width];
        let mut fb = vec![0u32; width * height];
        let bank = builtin_sprites();
        composite(
            &mut fb,
            &depth,
            width,
            height,
            &camera,
            &entities,
            &bank,
            &Lighting::unlit(),
        );
        assert!(fb.iter().all(|&p| p == 0));
    }

    #[test]
    fn visible_entity_writes_pixels_and_hit_tint_overrides_lighting() {
        let camera = Camera::new(Vec2::new(2.0, 2.0), 0.0, 66.0);
        let mut entities = vec![Entity::new(
            EntityKind::Enemy,
            Vec2::new(4.0, 2.0),
            Vec2::X,
        )];
        let (width, height) = (64usize, 48usize);
        let depth = vec![100.0f32; width];
        let mut fb = vec![0u32; width * height];
        let bank = builtin_sprites();
        composite(
            &mut fb, &depth, width, height, &camera, &entities, &bank, &Lighting::unlit(),
        );
        assert!(fb.iter().any(|&p| p != 0));

        entities[0].hit = true;
        let mut fb2 = vec![0u32; width * height];
        composite(
            &mut fb2, &depth, width, height, &camera, &entities, &bank, &Lighting::unlit(),
        );
        let tinted = fb2.iter().filter(|&&p| p == ALERT_TINT).count();
        let written = fb2.iter().filter(|&&p| p != 0).count();
        assert_eq!(tinted, written, "every composited pixel takes the tint");
        assert!(tinted > 0);
    }

    #[test]
    fn dead_entities_are_skipped_and_order_is_front_to_back() {
        let cam_pos = Vec2::new(0.0, 0.0);
        let mut entities = vec![
            Entity::new(EntityKind::Enemy, Vec2::new(8.0, 0.0), Vec2::X),
            Entity::new(EntityKind::Enemy, Vec2::new(3.0, 0.0), Vec2::X),
            Entity::new(EntityKind::Enemy, Vec2::new(5.0, 0.0), Vec2::X),
        ];
        entities[2].dead = true;
        let order = hit_order(&entities, cam_pos);
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn attack_frames_advance_with_the_anim_countdown() {
        let bank = builtin_sprites();
        let mut e = Entity::new(EntityKind::Enemy, Vec2::new(2.0, 2.0), Vec2::X);
        e.attacking = true;
        e.attack_anim = crate::entity::ATTACK_ANIM_TICKS;
        let first = select_frame(&bank.enemy, &e, Vec2::new(4.0, 2.0)) as *const Texture;
        e.attack_anim = 1;
        let last = select_frame(&bank.enemy, &e, Vec2::new(4.0, 2.0)) as *const Texture;
        assert_ne!(first, last, "a standing attacker must not freeze on one frame");
    }

    #[test]
    fn alert_tint_is_opaque_red() {
        assert_eq!(ALERT_TINT, 0xFFE6_2828);
        assert!(!is_transparent(ALERT_TINT));
    }
}
