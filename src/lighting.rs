use glam::Vec2;

use crate::texture::{lerp_color, mul_color, scale_color};

/// Surface layer a static light targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Floor,
    Wall,
    Ceiling,
}

pub struct PointLight {
    pub pos: Vec2,
    pub surface: Surface,
    pub radius: f32,
    pub intensity: f32,
    pub color: u32,
}

/// Distance fog plus static point lights. Lights are applied one at a
/// time in list order; the order never changes between frames so the
/// accumulated rounding is reproducible.
pub struct Lighting {
    pub enabled: bool,
    pub fog_distance: f32,
    pub lights: Vec<PointLight>,
}

impl Lighting {
    pub fn unlit() -> Self {
        Self {
            enabled: false,
            fog_distance: f32::INFINITY,
            lights: Vec::new(),
        }
    }

    /// Shade a texel at a world point. `depth` is the perpendicular
    /// distance used for the fog term; fully dark past fog_distance.
    pub fn shade(&self, texel: u32, point: Vec2, depth: f32, surface: Surface) -> u32 {
        if !self.enabled {
            return texel;
        }
        let fog = (1.0 - depth / self.fog_distance).clamp(0.0, 1.0);
        let mut out = scale_color(texel, (fog * 256.0) as u32);
        for light in &self.lights {
            if light.surface != surface {
                continue;
            }
            let d = (light.pos - point).length();
            if d >= light.radius {
                continue;
            }
            // Linear attenuation, zero at the radius edge
            let w = ((1.0 - d / light.radius) * light.intensity).clamp(0.0, 1.0);
            out = lerp_color(out, mul_color(texel, light.color), (w * 256.0) as u32);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::pack;

    #[test]
    fn disabled_lighting_passes_texels_through() {
        let lighting = Lighting::unlit();
        let c = pack(123, 45, 67);
        assert_eq!(lighting.shade(c, Vec2::ZERO, 100.0, Surface::Wall), c);
    }

    #[test]
    fn fog_is_fully_dark_past_the_limit() {
        let lighting = Lighting {
            enabled: true,
            fog_distance: 8.0,
            lights: Vec::new(),
        };
        let c = pack(200, 200, 200);
        let shaded = lighting.shade(c, Vec2::ZERO, 9.0, Surface::Wall);
        assert_eq!(shaded & 0x00FF_FFFF, 0);
    }

    #[test]
    fn light_ignores_other_surfaces_and_out_of_radius_points() {
        let lighting = Lighting {
            enabled: true,
            fog_distance: 8.0,
            lights: vec![PointLight {
                pos: Vec2::new(10.0, 0.0),
                surface: Surface::Floor,
                radius: 2.0,
                intensity: 1.0,
                color: pack(255, 255, 255),
            }],
        };
        let c = pack(100, 100, 100);
        let wall = lighting.shade(c, Vec2::new(10.0, 0.5), 4.0, Surface::Wall);
        let far_floor = lighting.shade(c, Vec2::new(13.0, 0.0), 4.0, Surface::Floor);
        // Both reduce to the pure fog term
        assert_eq!(wall, far_floor);
        let lit = lighting.shade(c, Vec2::new(10.0, 0.5), 4.0, Surface::Floor);
        assert!(lit & 0x00FF_FFFF > wall & 0x00FF_FFFF);
    }

    #[test]
    fn blend_order_is_list_order() {
        let red = PointLight {
            pos: Vec2::ZERO,
            surface: Surface::Wall,
            radius: 4.0,
            intensity: 1.0,
            color: pack(255, 0, 0),
        };
        let blue = PointLight {
            pos: Vec2::ZERO,
            surface: Surface::Wall,
            radius: 4.0,
            intensity: 0.5,
            color: pack(0, 0, 255),
        };
        let a = Lighting {
            enabled: true,
            fog_distance: 20.0,
            lights: vec![red, blue],
        };
        let c = pack(180, 180, 180);
        let first = a.shade(c, Vec2::new(1.0, 0.0), 2.0, Surface::Wall);
        // Applying the same list again yields the identical result
        assert_eq!(first, a.shade(c, Vec2::new(1.0, 0.0), 2.0, Surface::Wall));
    }
}
