use glam::Vec2;

/// Pitch is stored as a fraction of the half viewport height so the
/// horizon shift scales with the internal framebuffer resolution.
const PITCH_LIMIT: f32 = 0.85;

pub struct Camera {
    pub pos: Vec2,
    pub dir: Vec2,   // unit facing direction
    pub plane: Vec2, // perpendicular to dir, |plane| = tan(fov/2)
    pub pitch: f32,  // vertical look fraction in [-PITCH_LIMIT, PITCH_LIMIT]
}

impl Camera {
    pub fn new(pos: Vec2, yaw: f32, fov_deg: f32) -> Self {
        let dir = Vec2::from_angle(yaw);
        let half_fov = (0.5 * fov_deg.to_radians()).tan();
        Self {
            pos,
            dir,
            plane: dir.perp() * half_fov,
            pitch: 0.0,
        }
    }

    /// Ray through screen column x, mapping x linearly onto [-1, 1]
    #[inline]
    pub fn ray_dir(&self, x: usize, width: usize) -> Vec2 {
        let camera_x = 2.0 * x as f32 / width as f32 - 1.0;
        self.dir + self.plane * camera_x
    }

    pub fn rotate(&mut self, angle: f32) {
        let rot = Vec2::from_angle(angle);
        self.dir = rot.rotate(self.dir);
        self.plane = rot.rotate(self.plane);
    }

    pub fn look(&mut self, delta: f32) {
        self.pitch = (self.pitch + delta).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Vertical-look offset in pixels for the given viewport height
    #[inline]
    pub fn pitch_pixels(&self, height: usize) -> f32 {
        self.pitch * 0.5 * height as f32
    }

    /// Horizon row (fractional) for the given viewport height
    #[inline]
    pub fn horizon(&self, height: usize) -> f32 {
        0.5 * height as f32 + self.pitch_pixels(height)
    }

    /// Inverse determinant of the (plane, dir) basis, used to bring
    /// world points into camera space for sprite projection.
    #[inline]
    pub fn inv_det(&self) -> f32 {
        1.0 / (self.plane.x * self.dir.y - self.dir.x * self.plane.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_column_ray_is_facing_direction() {
        let cam = Camera::new(Vec2::new(4.0, 4.0), 0.3, 66.0);
        let ray = cam.ray_dir(320, 640);
        assert!((ray - cam.dir).length() < 1e-6);
    }

    #[test]
    fn edge_columns_span_the_fov_plane() {
        let cam = Camera::new(Vec2::ZERO, 0.0, 90.0);
        let left = cam.ray_dir(0, 640);
        // Leftmost column maps to camera_x = -1, i.e. dir - plane
        assert!((left - (cam.dir - cam.plane)).length() < 1e-6);
    }

    #[test]
    fn rotation_keeps_basis_orthogonal() {
        let mut cam = Camera::new(Vec2::ZERO, 0.0, 66.0);
        let mag = cam.plane.length();
        cam.rotate(1.234);
        assert!(cam.dir.dot(cam.plane).abs() < 1e-5);
        assert!((cam.dir.length() - 1.0).abs() < 1e-5);
        assert!((cam.plane.length() - mag).abs() < 1e-5);
    }

    #[test]
    fn pitch_clamps() {
        let mut cam = Camera::new(Vec2::ZERO, 0.0, 66.0);
        cam.look(10.0);
        assert!(cam.pitch <= PITCH_LIMIT);
        cam.look(-20.0);
        assert!(cam.pitch >= -PITCH_LIMIT);
    }
}
