use glam::Vec2;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;

use crate::camera::Camera;
use crate::level::{Cell, DOOR_PASSABLE, GridMap};
use crate::lighting::{Lighting, Surface};
use crate::texture::{TextureSet, scale_color};

/// Guard against division blowing up when the camera brushes a wall.
const MIN_PERP_DIST: f32 = 1e-4;

/// Internal render target dimensions plus the band split for the
/// worker pool. Bands are horizontal row ranges; each band owns a
/// disjoint slice of the pixel buffer.
pub struct Viewport {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
}

impl Viewport {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bands: 4,
        }
    }
}

/// Everything one ray learned about its column: enough for the wall
/// span, the floor/ceiling walk back toward the camera, and lighting.
pub struct ColumnHit {
    pub perp_dist: f32,
    pub tex: u8,
    /// Fractional hit coordinate on the non-stepped axis, door shift
    /// already applied.
    pub tex_u: f32,
    /// Exact world-space wall hit point.
    pub hit_point: Vec2,
    /// Unclamped wall span in screen rows.
    pub span_top: f32,
    pub span_bottom: f32,
    /// True when the ray stepped through a Y-boundary last (the
    /// classic darker side).
    pub y_side: bool,
}

/// Walk the grid with integer DDA until a wall or closed-enough door
/// stops the ray. The map boundary is solid by construction, so the
/// loop always terminates.
pub fn cast_column(map: &GridMap, camera: &Camera, x: usize, viewport: &Viewport) -> ColumnHit {
    let ray = camera.ray_dir(x, viewport.width);
    let mut map_x = camera.pos.x.floor() as i32;
    let mut map_y = camera.pos.y.floor() as i32;

    let delta_dist_x = if ray.x == 0.0 { f32::INFINITY } else { (1.0 / ray.x).abs() };
    let delta_dist_y = if ray.y == 0.0 { f32::INFINITY } else { (1.0 / ray.y).abs() };
    let step_x: i32 = if ray.x < 0.0 { -1 } else { 1 };
    let step_y: i32 = if ray.y < 0.0 { -1 } else { 1 };
    let mut side_dist_x = if ray.x < 0.0 {
        (camera.pos.x - map_x as f32) * delta_dist_x
    } else {
        (map_x as f32 + 1.0 - camera.pos.x) * delta_dist_x
    };
    let mut side_dist_y = if ray.y < 0.0 {
        (camera.pos.y - map_y as f32) * delta_dist_y
    } else {
        (map_y as f32 + 1.0 - camera.pos.y) * delta_dist_y
    };

    let mut y_side = false;
    let (tex, door_shift) = loop {
        if side_dist_x < side_dist_y {
            side_dist_x += delta_dist_x;
            map_x += step_x;
            y_side = false;
        } else {
            side_dist_y += delta_dist_y;
            map_y += step_y;
            y_side = true;
        }
        match map.cell(map_x, map_y) {
            Cell::Empty => {}
            Cell::Wall(id) => break (id, 0.0),
            Cell::Door { tex, open } => {
                if open < DOOR_PASSABLE {
                    // Partially open: the visible leaf slides sideways,
                    // expressed as a texture-U shift on the same plane
                    break (tex, open);
                }
            }
        }
    };

    let perp_dist = if y_side {
        (side_dist_y - delta_dist_y).max(MIN_PERP_DIST)
    } else {
        (side_dist_x - delta_dist_x).max(MIN_PERP_DIST)
    };

    // Fractional hit coordinate on the non-stepped axis
    let wall_x = if y_side {
        camera.pos.x + perp_dist * ray.x
    } else {
        camera.pos.y + perp_dist * ray.y
    };
    let mut tex_u = wall_x - wall_x.floor();
    if (!y_side && ray.x > 0.0) || (y_side && ray.y < 0.0) {
        tex_u = 1.0 - tex_u;
    }
    tex_u += door_shift;

    let line_height = viewport.height as f32 / perp_dist;
    let horizon = camera.horizon(viewport.height);

    ColumnHit {
        perp_dist,
        tex,
        tex_u,
        hit_point: camera.pos + ray * perp_dist,
        span_top: horizon - 0.5 * line_height,
        span_bottom: horizon + 0.5 * line_height,
        y_side,
    }
}

/// DDA pass for every column, in parallel, filling the depth buffer.
/// The depth buffer is complete before any surface or sprite pixel is
/// written; sprites and the weapon hit-scan read it afterwards.
pub fn cast_columns(
    map: &GridMap,
    camera: &Camera,
    viewport: &Viewport,
    depth: &mut [f32],
) -> Vec<ColumnHit> {
    debug_assert_eq!(depth.len(), viewport.width);
    let hits: Vec<ColumnHit> = (0..viewport.width)
        .into_par_iter()
        .map(|x| cast_column(map, camera, x, viewport))
        .collect();
    for (d, hit) in depth.iter_mut().zip(&hits) {
        *d = hit.perp_dist;
    }
    hits
}

/// Wall, floor and ceiling pixels for the whole frame. The framebuffer
/// is split into `viewport.bands` disjoint row bands dispatched on the
/// rayon pool; the call blocks until every band has finished.
pub fn draw_surfaces(
    fb: &mut [u32],
    viewport: &Viewport,
    map: &GridMap,
    camera: &Camera,
    textures: &TextureSet,
    lighting: &Lighting,
    hits: &[ColumnHit],
) {
    let width = viewport.width;
    let height = viewport.height;
    let horizon = camera.horizon(height);
    let band_rows = height.div_ceil(viewport.bands.max(1));

    fb.par_chunks_mut(width * band_rows)
        .enumerate()
        .for_each(|(band, rows)| {
            let y0 = band * band_rows;
            for (row_i, row) in rows.chunks_mut(width).enumerate() {
                let y = (y0 + row_i) as f32;
                // Per-row depth of the floor/ceiling plane at this row;
                // the horizon row itself resolves to the fog limit
                let below = y + 0.5 > horizon;
                let row_dist = {
                    let denom = if below { y + 0.5 - horizon } else { horizon - y - 0.5 };
                    if denom <= 0.0 {
                        f32::INFINITY
                    } else {
                        0.5 * height as f32 / denom
                    }
                };
                for (x, pixel) in row.iter_mut().enumerate() {
                    let hit = &hits[x];
                    if y >= hit.span_top && y < hit.span_bottom {
                        // Wall slice: inverse-map the row into texture V
                        let texture = textures.get(hit.tex);
                        let size = texture.size();
                        let tex_x = (hit.tex_u * size as f32) as usize;
                        let tex_y =
                            ((y - hit.span_top) * size as f32 / (hit.span_bottom - hit.span_top))
                                as usize;
                        let mut texel = texture.texel(tex_x, tex_y);
                        if hit.y_side {
                            texel = scale_color(texel, 176);
                        }
                        *pixel = lighting.shade(texel, hit.hit_point, hit.perp_dist, Surface::Wall);
                    } else if row_dist.is_finite() {
                        // Interpolate between camera and wall hit,
                        // weighted by the per-row depth
                        let weight = (row_dist / hit.perp_dist).clamp(0.0, 1.0);
                        let point = camera.pos + (hit.hit_point - camera.pos) * weight;
                        let cell_x = point.x.floor() as i32;
                        let cell_y = point.y.floor() as i32;
                        let (id, surface) = if below {
                            (map.floor_id(cell_x, cell_y), Surface::Floor)
                        } else {
                            (map.ceiling_id(cell_x, cell_y), Surface::Ceiling)
                        };
                        let texture = textures.get(id);
                        let texel =
                            texture.sample(point.x - point.x.floor(), point.y - point.y.floor());
                        *pixel = lighting.shade(texel, point, row_dist, surface);
                    } else {
                        *pixel = 0xFF00_0000;
                    }
                }
            }
        });
}

/// One full static-geometry pass: DDA, depth buffer, then the banded
/// surface draw. Sprites composite on top afterwards.
pub fn render(
    fb: &mut [u32],
    depth: &mut [f32],
    viewport: &Viewport,
    map: &GridMap,
    camera: &Camera,
    textures: &TextureSet,
    lighting: &Lighting,
) {
    let hits = cast_columns(map, camera, viewport, depth);
    draw_surfaces(fb, viewport, map, camera, textures, lighting, &hits);
}
