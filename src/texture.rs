use crate::level::ConfigError;
use crate::rng::Rng;
use crate::sprite::DIRECTIONS_8;

/// Alpha-zero sentinel: any texel with a zero alpha byte is skipped
/// entirely when compositing sprites.
pub const TRANSPARENT: u32 = 0;

/// Side length of generated entity sprite frames.
pub const SPRITE_SIZE: usize = 64;

#[inline]
pub const fn pack(r: u8, g: u8, b: u8) -> u32 {
    // 0xAARRGGBB, opaque. softbuffer ignores the alpha byte on present.
    0xFF00_0000 | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

#[inline]
pub fn is_transparent(color: u32) -> bool {
    color >> 24 == 0
}

/// Fixed-point 8.8 blend of two packed colors, weight in [0, 256].
/// R and B ride in one multiply through the 0x00FF00FF mask, G in the
/// other; alpha comes from `a`.
#[inline]
pub fn lerp_color(a: u32, b: u32, w256: u32) -> u32 {
    let inv = 256 - w256;
    let rb = ((a & 0x00FF00FF) * inv + (b & 0x00FF00FF) * w256) >> 8 & 0x00FF00FF;
    let g = ((a & 0x0000FF00) * inv + (b & 0x0000FF00) * w256) >> 8 & 0x0000FF00;
    (a & 0xFF00_0000) | rb | g
}

/// Scale a color toward black, weight in [0, 256].
#[inline]
pub fn scale_color(c: u32, w256: u32) -> u32 {
    let rb = ((c & 0x00FF00FF) * w256) >> 8 & 0x00FF00FF;
    let g = ((c & 0x0000FF00) * w256) >> 8 & 0x0000FF00;
    (c & 0xFF00_0000) | rb | g
}

/// Channelwise modulate, e.g. a texel by a light color.
#[inline]
pub fn mul_color(a: u32, b: u32) -> u32 {
    let r = ((a >> 16 & 0xFF) * (b >> 16 & 0xFF)) / 255;
    let g = ((a >> 8 & 0xFF) * (b >> 8 & 0xFF)) / 255;
    let bl = ((a & 0xFF) * (b & 0xFF)) / 255;
    (a & 0xFF00_0000) | (r << 16) | (g << 8) | bl
}

/// Square power-of-two image, packed 32-bit color. The mask makes
/// texel lookup wrap instead of bounds-check.
pub struct Texture {
    size: usize,
    mask: usize,
    pixels: Vec<u32>,
}

impl Texture {
    /// `index` only labels the error when the shape is rejected.
    pub fn from_pixels(index: usize, size: usize, pixels: Vec<u32>) -> Result<Self, ConfigError> {
        if size == 0 || !size.is_power_of_two() || pixels.len() != size * size {
            return Err(ConfigError::BadTextureShape {
                index,
                width: size,
                height: pixels.len() / size.max(1),
            });
        }
        Ok(Self {
            size,
            mask: size - 1,
            pixels,
        })
    }

    pub fn from_fn(size: usize, f: impl Fn(usize, usize) -> u32) -> Self {
        let mut pixels = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                pixels.push(f(x, y));
            }
        }
        Self {
            size,
            mask: size - 1,
            pixels,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Wrapping texel fetch; coordinates may exceed the texture size.
    #[inline]
    pub fn texel(&self, x: usize, y: usize) -> u32 {
        self.pixels[(y & self.mask) * self.size + (x & self.mask)]
    }

    /// Texel at fractional coordinates in [0, 1) with wraparound.
    #[inline]
    pub fn sample(&self, u: f32, v: f32) -> u32 {
        let x = (u * self.size as f32) as usize;
        let y = (v * self.size as f32) as usize;
        self.texel(x, y)
    }
}

/// Indexable set of equally sized wall/floor/ceiling textures. Id 0 is
/// a magenta placeholder that layers should never reference visibly.
pub struct TextureSet {
    textures: Vec<Texture>,
}

impl TextureSet {
    pub fn new(textures: Vec<Texture>) -> Result<Self, ConfigError> {
        for (index, t) in textures.iter().enumerate() {
            if !t.size.is_power_of_two() {
                return Err(ConfigError::BadTextureShape {
                    index,
                    width: t.size,
                    height: t.size,
                });
            }
        }
        Ok(Self { textures })
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Valid ids are a startup precondition; no per-pixel range check.
    #[inline]
    pub fn get(&self, id: u8) -> &Texture {
        &self.textures[id as usize]
    }
}

/// Walking frames per 8 view directions plus attack and death
/// sequences, all the same sprite size.
pub struct SpriteBundle {
    pub walk: [Vec<Texture>; 8],
    pub attack: Vec<Texture>,
    pub death: Vec<Texture>,
}

/// One bundle per simulated entity kind.
pub struct SpriteBank {
    pub enemy: SpriteBundle,
    pub neutral: SpriteBundle,
    pub turret: SpriteBundle,
    pub ammo: SpriteBundle,
}

const WALK_FRAMES: usize = 4;

/// Procedural stand-ins for the entity sprite sheets: a shaded body
/// disc, a facing marker that tracks the view direction, and a leg bob
/// driven by the frame index. Attack frames flash, death frames sink.
fn paint_frame(base: u32, view_dir: usize, frame: usize, pose: Pose) -> Texture {
    let s = SPRITE_SIZE as f32;
    let center = s * 0.5;
    let body_r = s * 0.30;
    let marker = DIRECTIONS_8[view_dir] * body_r * 0.6;
    let bob = match pose {
        Pose::Walk => ((frame % WALK_FRAMES) as f32 - 1.5).abs() * 2.0,
        _ => 0.0,
    };
    let sink = match pose {
        Pose::Death => frame as f32 * s * 0.18,
        _ => 0.0,
    };
    let color = match pose {
        Pose::Attack => lerp_color(base, pack(255, 240, 120), 128),
        _ => base,
    };
    Texture::from_fn(SPRITE_SIZE, |x, y| {
        let px = x as f32 - center;
        let py = y as f32 - (center + bob + sink);
        let d2 = px * px + py * py;
        if d2 < body_r * body_r {
            let mx = px - marker.x;
            let my = py - marker.y;
            if mx * mx + my * my < (body_r * 0.25) * (body_r * 0.25) {
                pack(20, 20, 20)
            } else {
                // cheap top-left shading on the disc
                let shade = (200.0 - (px + py)).clamp(96.0, 255.0) as u32;
                scale_color(color, shade)
            }
        } else if d2 < (body_r + 2.0) * (body_r + 2.0) {
            pack(10, 10, 10)
        } else {
            TRANSPARENT
        }
    })
}

#[derive(Clone, Copy)]
enum Pose {
    Walk,
    Attack,
    Death,
}

fn build_bundle(base: u32) -> SpriteBundle {
    let walk = std::array::from_fn(|dir| {
        (0..WALK_FRAMES)
            .map(|f| paint_frame(base, dir, f, Pose::Walk))
            .collect()
    });
    let attack = (0..2).map(|f| paint_frame(base, 0, f, Pose::Attack)).collect();
    let death = (0..3).map(|f| paint_frame(base, 0, f, Pose::Death)).collect();
    SpriteBundle { walk, attack, death }
}

pub fn builtin_sprites() -> SpriteBank {
    SpriteBank {
        enemy: build_bundle(pack(200, 60, 50)),
        neutral: build_bundle(pack(90, 160, 220)),
        turret: build_bundle(pack(140, 140, 150)),
        ammo: build_bundle(pack(220, 190, 60)),
    }
}

/// Built-in wall/floor/ceiling set. Index 0 is the placeholder; the
/// demo level references ids 1..=6.
pub fn builtin_textures(size: usize) -> Result<TextureSet, ConfigError> {
    let mut noise = Rng::new(0x5eed);
    let mut grain = vec![0u32; size * size];
    for g in &mut grain {
        *g = noise.next_range(32);
    }
    let grain_at = move |x: usize, y: usize| grain[(y % size) * size + (x % size)];

    let placeholder = Texture::from_fn(size, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            pack(255, 0, 255)
        } else {
            pack(0, 0, 0)
        }
    });
    let brick = Texture::from_fn(size, |x, y| {
        let row = y / (size / 8);
        let offset = if row % 2 == 0 { 0 } else { size / 8 };
        let mortar = y % (size / 8) == 0 || (x + offset) % (size / 4) == 0;
        if mortar {
            pack(70, 60, 58)
        } else {
            let g = grain_at(x, y) as u8;
            pack(150 + g / 2, 70 + g / 4, 60)
        }
    });
    let stone = Texture::from_fn(size, |x, y| {
        let g = grain_at(x, y) as u8;
        pack(100 + g, 100 + g, 110 + g)
    });
    let slab = Texture::from_fn(size, |x, y| {
        let edge = x % (size / 2) < 2 || y % (size / 2) < 2;
        let g = grain_at(x, y) as u8;
        if edge {
            pack(50, 52, 60)
        } else {
            pack(80 + g, 84 + g, 96 + g)
        }
    });
    let door = Texture::from_fn(size, |x, y| {
        let frame = x < 4 || x >= size - 4 || y < 4 || y >= size - 4;
        let plank = (x / (size / 4)) % 2 == 0;
        if frame {
            pack(60, 48, 30)
        } else if plank {
            pack(130, 96, 48)
        } else {
            pack(110, 80, 40)
        }
    });
    let floor = Texture::from_fn(size, |x, y| {
        let g = grain_at(x, y) as u8;
        if (x / (size / 4) + y / (size / 4)) % 2 == 0 {
            pack(60 + g, 60 + g, 64 + g)
        } else {
            pack(42 + g, 42 + g, 46 + g)
        }
    });
    let ceiling = Texture::from_fn(size, |x, y| {
        let rib = y % (size / 4) < 2;
        let g = grain_at(x, y) as u8;
        if rib {
            pack(34, 32, 40)
        } else {
            pack(52 + g / 2, 48 + g / 2, 58 + g / 2)
        }
    });
    TextureSet::new(vec![placeholder, brick, stone, slab, door, floor, ceiling])
}
