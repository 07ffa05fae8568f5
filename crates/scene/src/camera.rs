use foundation::math::{Mat4, Vec3};

/// Viewer camera at the panorama center.
///
/// Orientation is yaw (around +Y, radians) then pitch (around +X). Yaw 0,
/// pitch 0 looks down -Z. Zoom is expressed through the vertical field of
/// view.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub fov_y_rad: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    yaw: f64,
    pitch: f64,
}

impl Camera {
    pub fn new(fov_y_rad: f64, aspect: f64, near: f64, far: f64) -> Self {
        Self {
            fov_y_rad,
            aspect,
            near,
            far,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn set_orientation(&mut self, yaw: f64, pitch: f64) {
        self.yaw = yaw;
        self.pitch = pitch;
    }

    pub fn set_fov(&mut self, fov_y_rad: f64) {
        self.fov_y_rad = fov_y_rad;
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective(self.fov_y_rad, self.aspect, self.near, self.far)
    }

    /// Inverse of the camera's world transform (the view matrix). The camera
    /// sits at the origin, so this is pure rotation.
    pub fn world_inverse(&self) -> Mat4 {
        Mat4::rotation_x(-self.pitch) * Mat4::rotation_y(-self.yaw)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.world_inverse()
    }

    /// Unit vector the camera looks along, in world space.
    pub fn view_direction(&self) -> Vec3 {
        (Mat4::rotation_y(self.yaw) * Mat4::rotation_x(self.pitch))
            .transform_dir(Vec3::new(0.0, 0.0, -1.0))
    }
}
