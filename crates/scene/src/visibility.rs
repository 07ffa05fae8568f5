use foundation::math::{Mat4, Vec3};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    pub n: [f64; 3],
    pub d: f64,
}

impl Plane {
    pub fn new(n: [f64; 3], d: f64) -> Self {
        Self { n, d }
    }

    pub fn normalize(self) -> Self {
        let l2 = self.n[0] * self.n[0] + self.n[1] * self.n[1] + self.n[2] * self.n[2];
        if l2 <= 0.0 {
            return self;
        }
        let inv = 1.0 / l2.sqrt();
        Self {
            n: [self.n[0] * inv, self.n[1] * inv, self.n[2] * inv],
            d: self.d * inv,
        }
    }

    pub fn distance(&self, p: Vec3) -> f64 {
        self.n[0] * p.x + self.n[1] * p.y + self.n[2] * p.z + self.d
    }
}

/// View frustum as 6 planes.
///
/// Convention:
/// - A point `p` is inside iff `plane.distance(p) >= 0` for all planes.
/// - Planes are expected to be in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    pub left: Plane,
    pub right: Plane,
    pub bottom: Plane,
    pub top: Plane,
    pub near: Plane,
    pub far: Plane,
}

impl Frustum {
    pub fn new(
        left: Plane,
        right: Plane,
        bottom: Plane,
        top: Plane,
        near: Plane,
        far: Plane,
    ) -> Self {
        Self {
            left,
            right,
            bottom,
            top,
            near,
            far,
        }
    }

    pub fn normalize(self) -> Self {
        Self {
            left: self.left.normalize(),
            right: self.right.normalize(),
            bottom: self.bottom.normalize(),
            top: self.top.normalize(),
            near: self.near.normalize(),
            far: self.far.normalize(),
        }
    }

    /// Build a frustum from a row-major view-projection matrix.
    ///
    /// This expects the clip-space convention where visible points satisfy:
    /// - `-w <= x <= w`
    /// - `-w <= y <= w`
    /// - `0 <= z <= w` (z0)
    pub fn from_view_proj(m: Mat4) -> Self {
        // Rows r0..r3
        let r0 = m.rows[0];
        let r1 = m.rows[1];
        let r2 = m.rows[2];
        let r3 = m.rows[3];

        // Planes: r3 +/- r{0,1,2}
        // Left:  r3 + r0
        // Right: r3 - r0
        // Bottom:r3 + r1
        // Top:   r3 - r1
        // Near:  r3 + r2  (z0)
        // Far:   r3 - r2
        let left = Plane::new([r3[0] + r0[0], r3[1] + r0[1], r3[2] + r0[2]], r3[3] + r0[3]);
        let right = Plane::new([r3[0] - r0[0], r3[1] - r0[1], r3[2] - r0[2]], r3[3] - r0[3]);
        let bottom = Plane::new([r3[0] + r1[0], r3[1] + r1[1], r3[2] + r1[2]], r3[3] + r1[3]);
        let top = Plane::new([r3[0] - r1[0], r3[1] - r1[1], r3[2] - r1[2]], r3[3] - r1[3]);
        let near = Plane::new([r3[0] + r2[0], r3[1] + r2[1], r3[2] + r2[2]], r3[3] + r2[3]);
        let far = Plane::new([r3[0] - r2[0], r3[1] - r2[1], r3[2] - r2[2]], r3[3] - r2[3]);

        Self::new(left, right, bottom, top, near, far).normalize()
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        for plane in [
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        ] {
            if plane.distance(p) < 0.0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{Frustum, Plane};
    use foundation::math::{Mat4, Vec3};

    fn unit_cube_frustum() -> Frustum {
        // Cube: -1<=x<=1, -1<=y<=1, -1<=z<=1
        // Planes in the form n·p + d >= 0
        let left = Plane::new([1.0, 0.0, 0.0], 1.0); // x >= -1
        let right = Plane::new([-1.0, 0.0, 0.0], 1.0); // x <= 1
        let bottom = Plane::new([0.0, 1.0, 0.0], 1.0); // y >= -1
        let top = Plane::new([0.0, -1.0, 0.0], 1.0); // y <= 1
        let near = Plane::new([0.0, 0.0, 1.0], 1.0); // z >= -1
        let far = Plane::new([0.0, 0.0, -1.0], 1.0); // z <= 1
        Frustum::new(left, right, bottom, top, near, far)
    }

    #[test]
    fn contains_point_basic() {
        let f = unit_cube_frustum();
        assert!(f.contains_point(Vec3::new(0.5, -0.5, 0.0)));
        assert!(!f.contains_point(Vec3::new(2.0, 0.0, 0.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, -1.5)));
    }

    #[test]
    fn view_proj_frustum_sees_ahead_not_behind() {
        let view_proj = Mat4::perspective(1.2, 1.6, 0.1, 100.0);
        let f = Frustum::from_view_proj(view_proj);

        assert!(f.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(f.contains_point(Vec3::new(1.0, 0.5, -10.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, -0.05))); // closer than near
        assert!(!f.contains_point(Vec3::new(50.0, 0.0, -10.0))); // far off to the side
    }

    #[test]
    fn rotated_view_moves_the_visible_set() {
        let vp = Mat4::perspective(1.2, 1.6, 0.1, 100.0)
            * Mat4::rotation_y(-std::f64::consts::FRAC_PI_2);
        let f = Frustum::from_view_proj(vp);

        // Looking along -X now.
        assert!(f.contains_point(Vec3::new(-10.0, 0.0, 0.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, -10.0)));
    }
}
