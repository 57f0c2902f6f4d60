use glam::Vec3;

const MIN_BETA: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraKind {
    /// Orbits `target` at `radius`; `alpha` is the longitudinal and `beta`
    /// the latitudinal rotation.
    ArcRotate {
        alpha: f32,
        beta: f32,
        radius: f32,
        lower_radius_limit: f32,
        upper_radius_limit: f32,
    },
    /// Free camera placed at an explicit position.
    Universal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraInput {
    Rotate { delta_alpha: f32, delta_beta: f32 },
    Zoom { delta: f32 },
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub name: String,
    pub kind: CameraKind,
    pub position: Vec3,
    pub target: Vec3,
    pub controls_attached: bool,
}

impl Camera {
    pub fn arc_rotate(name: &str, alpha: f32, beta: f32, radius: f32, target: Vec3) -> Self {
        let mut camera = Self {
            name: name.to_string(),
            kind: CameraKind::ArcRotate {
                alpha,
                beta,
                radius,
                lower_radius_limit: 0.0,
                upper_radius_limit: f32::MAX,
            },
            position: Vec3::ZERO,
            target,
            controls_attached: false,
        };
        camera.rebuild_position();
        camera
    }

    pub fn universal(name: &str, position: Vec3) -> Self {
        Self {
            name: name.to_string(),
            kind: CameraKind::Universal,
            position,
            target: position + Vec3::Z,
            controls_attached: false,
        }
    }

    pub fn is_orbiting(&self) -> bool {
        matches!(self.kind, CameraKind::ArcRotate { .. })
    }

    pub fn set_radius_limits(&mut self, lower: f32, upper: f32) {
        if let CameraKind::ArcRotate {
            radius,
            lower_radius_limit,
            upper_radius_limit,
            ..
        } = &mut self.kind
        {
            *lower_radius_limit = lower;
            *upper_radius_limit = upper;
            *radius = radius.clamp(lower, upper);
        }
        self.rebuild_position();
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.rebuild_position();
    }

    /// Applies pointer/wheel input. Ignored unless controls are attached.
    pub fn apply_input(&mut self, input: CameraInput) -> bool {
        if !self.controls_attached {
            return false;
        }
        let CameraKind::ArcRotate {
            alpha,
            beta,
            radius,
            lower_radius_limit,
            upper_radius_limit,
        } = &mut self.kind
        else {
            return false;
        };
        match input {
            CameraInput::Rotate {
                delta_alpha,
                delta_beta,
            } => {
                *alpha += delta_alpha;
                *beta = (*beta + delta_beta).clamp(MIN_BETA, std::f32::consts::PI - MIN_BETA);
            }
            CameraInput::Zoom { delta } => {
                *radius = (*radius + delta).clamp(*lower_radius_limit, *upper_radius_limit);
            }
        }
        self.rebuild_position();
        true
    }

    fn rebuild_position(&mut self) {
        if let CameraKind::ArcRotate {
            alpha, beta, radius, ..
        } = self.kind
        {
            let (sin_beta, cos_beta) = beta.sin_cos();
            let (sin_alpha, cos_alpha) = alpha.sin_cos();
            self.position = self.target
                + Vec3::new(
                    radius * cos_alpha * sin_beta,
                    radius * cos_beta,
                    radius * sin_alpha * sin_beta,
                );
        }
    }
}
