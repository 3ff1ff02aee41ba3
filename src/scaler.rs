use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;

use crate::texture::lerp_color;

/// Bilinear upscaler from the internal render target to the window
/// surface. The source-neighbor indices and 8.8 fixed-point weights
/// are precomputed per destination row/column so the per-frame blit is
/// pure table lookups; rows are processed in parallel.
pub struct Upscaler {
    dst_w: usize,
    x0: Vec<usize>,
    x1: Vec<usize>,
    wx: Vec<u32>,
    y0: Vec<usize>,
    y1: Vec<usize>,
    wy: Vec<u32>,
}

impl Upscaler {
    pub fn empty() -> Self {
        Self {
            dst_w: 0,
            x0: Vec::new(),
            x1: Vec::new(),
            wx: Vec::new(),
            y0: Vec::new(),
            y1: Vec::new(),
            wy: Vec::new(),
        }
    }

    pub fn new(dst_w: usize, dst_h: usize, src_w: usize, src_h: usize) -> Self {
        let mut lut = Self {
            dst_w,
            x0: vec![0; dst_w],
            x1: vec![0; dst_w],
            wx: vec![0; dst_w],
            y0: vec![0; dst_h],
            y1: vec![0; dst_h],
            wy: vec![0; dst_h],
        };
        let sx = src_w as f32 / dst_w.max(1) as f32;
        let sy = src_h as f32 / dst_h.max(1) as f32;
        for x in 0..dst_w {
            let fx = x as f32 * sx;
            let lo = fx.floor() as usize;
            lut.x0[x] = lo.min(src_w - 1);
            lut.x1[x] = (lo + 1).min(src_w - 1);
            lut.wx[x] = ((fx - lo as f32) * 256.0).round() as u32;
        }
        for y in 0..dst_h {
            let fy = y as f32 * sy;
            let lo = fy.floor() as usize;
            lut.y0[y] = lo.min(src_h - 1);
            lut.y1[y] = (lo + 1).min(src_h - 1);
            lut.wy[y] = ((fy - lo as f32) * 256.0).round() as u32;
        }
        lut
    }

    /// Stretch `src` over `dst`. `dst` must hold dst_w * dst_h pixels
    /// from `new`, `src` src_w * src_h.
    pub fn blit(&self, dst: &mut [u32], src: &[u32], src_w: usize) {
        dst.par_chunks_mut(self.dst_w)
            .enumerate()
            .for_each(|(y, dst_row)| {
                let row0 = self.y0[y] * src_w;
                let row1 = self.y1[y] * src_w;
                let wy = self.wy[y];
                for (x, out) in dst_row.iter_mut().enumerate() {
                    let x0 = self.x0[x];
                    let x1 = self.x1[x];
                    let wx = self.wx[x];
                    let top = lerp_color(src[row0 + x0], src[row0 + x1], wx);
                    let bot = lerp_color(src[row1 + x0], src[row1 + x1], wx);
                    *out = lerp_color(top, bot, wy);
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::pack;

    #[test]
    fn uniform_source_stays_uniform() {
        let src = vec![pack(80, 90, 100); 4 * 4];
        let up = Upscaler::new(8, 8, 4, 4);
        let mut dst = vec![0u32; 8 * 8];
        up.blit(&mut dst, &src, 4);
        assert!(dst.iter().all(|&p| p == pack(80, 90, 100)));
    }

    #[test]
    fn identity_scale_copies_pixels() {
        let src: Vec<u32> = (0..16).map(|i| pack(i as u8 * 10, 0, 0)).collect();
        let up = Upscaler::new(4, 4, 4, 4);
        let mut dst = vec![0u32; 16];
        up.blit(&mut dst, &src, 4);
        assert_eq!(dst, src);
    }
}
