//! CPU shadow culling over a camera and the visible-light list
//!
//! Fits cascade, spot and cube-face views the way the GPU backends expect:
//! right-handed views, projections with clip depth in [-1, 1].

use glam::{Mat4, Vec3, Vec4};

use super::{Bounds, CubemapFace, DirectionalShadowSplit, ShadowCulling, ShadowViewProjection};
use crate::light::VisibleLight;

/// Camera parameters needed to split the view frustum into cascades
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowCamera {
    /// World to camera-view transform
    pub world_to_view: Mat4,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Width / height
    pub aspect: f32,
    /// Near plane distance
    pub near: f32,
}

impl ShadowCamera {
    /// Camera at `eye` looking at `target`
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32) -> Self {
        Self {
            world_to_view: Mat4::look_at_rh(eye, target, Vec3::Y),
            fov_y,
            aspect,
            near,
        }
    }

    /// World-space corners of the frustum slice between `near` and `far`
    pub fn frustum_corners(&self, near: f32, far: f32) -> [Vec3; 8] {
        let view_to_world = self.world_to_view.inverse();
        let tan_half = (self.fov_y * 0.5).tan();
        let mut corners = [Vec3::ZERO; 8];

        for (plane, depth) in [near, far].into_iter().enumerate() {
            let half_h = depth * tan_half;
            let half_w = half_h * self.aspect;
            let quad = [
                Vec3::new(-half_w, -half_h, -depth),
                Vec3::new(half_w, -half_h, -depth),
                Vec3::new(-half_w, half_h, -depth),
                Vec3::new(half_w, half_h, -depth),
            ];
            for (i, corner) in quad.into_iter().enumerate() {
                corners[plane * 4 + i] = view_to_world.transform_point3(corner);
            }
        }

        corners
    }
}

/// Reference [`ShadowCulling`] implementation
///
/// Caster bounds come from the lights themselves; views are fitted to the
/// camera frustum (directional) or to the light's range (point, spot).
#[derive(Clone, Debug)]
pub struct SceneShadowCulling<'a> {
    camera: ShadowCamera,
    lights: &'a [VisibleLight],
    max_distance: f32,
    light_index_map_len: usize,
}

impl<'a> SceneShadowCulling<'a> {
    /// Create culling for a frame
    pub fn new(camera: ShadowCamera, lights: &'a [VisibleLight], max_distance: f32) -> Self {
        Self {
            camera,
            lights,
            max_distance,
            light_index_map_len: 0,
        }
    }

    /// Report a longer per-object light index map (lights tracked beyond the
    /// visible list)
    pub fn with_light_index_map_len(mut self, len: usize) -> Self {
        self.light_index_map_len = len;
        self
    }

    /// Visible lights this culling was built from
    pub fn lights(&self) -> &'a [VisibleLight] {
        self.lights
    }

    /// Camera-space depth range covered by one cascade
    pub fn cascade_range(&self, cascade_index: usize, cascade_count: usize, ratios: Vec3) -> (f32, f32) {
        let split = |i: usize| {
            if i + 1 >= cascade_count {
                self.max_distance
            } else {
                ratios[i.min(2)] * self.max_distance
            }
        };

        let near = if cascade_index == 0 {
            self.camera.near
        } else {
            split(cascade_index - 1)
        };
        (near, split(cascade_index).max(near))
    }
}

impl ShadowCulling for SceneShadowCulling<'_> {
    fn caster_bounds(&self, visible_index: usize) -> Option<Bounds> {
        self.lights.get(visible_index)?.caster_bounds
    }

    fn compute_directional_shadow_matrices(
        &self,
        visible_index: usize,
        cascade_index: usize,
        cascade_count: usize,
        cascade_ratios: Vec3,
        tile_size: u32,
        near_plane_offset: f32,
    ) -> DirectionalShadowSplit {
        let direction = self
            .lights
            .get(visible_index)
            .map(VisibleLight::forward)
            .unwrap_or(Vec3::NEG_Y);

        let (near, far) = self.cascade_range(cascade_index, cascade_count, cascade_ratios);
        let corners = self.camera.frustum_corners(near, far);
        let (center, radius) = bounding_sphere(&corners);

        // Pull the eye back so casters between the light and the sphere still render
        let pull_back = radius + near_plane_offset.max(0.0);
        let eye = center - direction * pull_back;
        let view = Mat4::look_at_rh(eye, eye + direction, up_vector(direction));
        let projection = Mat4::orthographic_rh_gl(-radius, radius, -radius, radius, 0.0, pull_back + radius);

        DirectionalShadowSplit {
            view,
            projection: snap_to_texel(projection, &view, tile_size),
            culling_sphere: center.extend(radius),
        }
    }

    fn compute_spot_shadow_matrices(&self, visible_index: usize) -> ShadowViewProjection {
        let Some(light) = self.lights.get(visible_index) else {
            return ShadowViewProjection { view: Mat4::IDENTITY, projection: Mat4::IDENTITY };
        };

        let forward = light.forward();
        let (near, far) = light_clip_range(light);
        let fov = light.spot_angle.clamp(1.0, 179.0).to_radians();

        ShadowViewProjection {
            view: Mat4::look_at_rh(light.position(), light.position() + forward, up_vector(forward)),
            projection: Mat4::perspective_rh_gl(fov, 1.0, near, far),
        }
    }

    fn compute_point_shadow_matrices(
        &self,
        visible_index: usize,
        face: CubemapFace,
        fov_bias: f32,
    ) -> ShadowViewProjection {
        let Some(light) = self.lights.get(visible_index) else {
            return ShadowViewProjection { view: Mat4::IDENTITY, projection: Mat4::IDENTITY };
        };

        let (forward, up) = face.basis();
        let (near, far) = light_clip_range(light);
        let fov = (90.0 + fov_bias).to_radians();

        ShadowViewProjection {
            view: Mat4::look_at_rh(light.position(), light.position() + forward, up),
            projection: Mat4::perspective_rh_gl(fov, 1.0, near, far),
        }
    }

    fn light_index_map_len(&self) -> usize {
        self.light_index_map_len
    }
}

fn light_clip_range(light: &VisibleLight) -> (f32, f32) {
    let near = light.shadow_near_plane.max(0.01);
    (near, light.range.max(near + 0.01))
}

/// Centroid sphere enclosing all points
fn bounding_sphere(points: &[Vec3; 8]) -> (Vec3, f32) {
    let center = points.iter().copied().sum::<Vec3>() / 8.0;
    let radius = points
        .iter()
        .map(|p| p.distance(center))
        .fold(0.0f32, f32::max);
    (center, radius)
}

/// Up vector that is never parallel to `direction`
fn up_vector(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.9 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Shift the projection so the world origin lands on a texel center,
/// which keeps cascades from shimmering as the camera moves
fn snap_to_texel(mut projection: Mat4, view: &Mat4, resolution: u32) -> Mat4 {
    let origin: Vec4 = (projection * *view) * Vec4::W;
    let texel_size = 2.0 / resolution.max(1) as f32;

    let snapped_x = (origin.x / texel_size).round() * texel_size;
    let snapped_y = (origin.y / texel_size).round() * texel_size;

    projection.w_axis.x += snapped_x - origin.x;
    projection.w_axis.y += snapped_y - origin.y;
    projection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> ShadowCamera {
        ShadowCamera::look_at(Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO, 60f32.to_radians(), 16.0 / 9.0, 0.3)
    }

    #[test]
    fn test_bounding_sphere_cube() {
        let points = [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ];

        let (center, radius) = bounding_sphere(&points);
        assert!(center.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert!((radius - 3.0_f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_cascade_ranges_follow_ratios() {
        let lights: [VisibleLight; 0] = [];
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        let ratios = Vec3::new(0.1, 0.25, 0.5);

        assert_eq!(culling.cascade_range(0, 4, ratios), (0.3, 10.0));
        assert_eq!(culling.cascade_range(1, 4, ratios), (10.0, 25.0));
        assert_eq!(culling.cascade_range(2, 4, ratios), (25.0, 50.0));
        assert_eq!(culling.cascade_range(3, 4, ratios), (50.0, 100.0));

        // Two cascades only use the first ratio
        assert_eq!(culling.cascade_range(1, 2, ratios), (10.0, 100.0));
    }

    #[test]
    fn test_frustum_corners_at_depth() {
        let cam = ShadowCamera {
            world_to_view: Mat4::IDENTITY,
            fov_y: 90f32.to_radians(),
            aspect: 1.0,
            near: 0.1,
        };

        let corners = cam.frustum_corners(1.0, 2.0);
        assert!(corners[0].abs_diff_eq(Vec3::new(-1.0, -1.0, -1.0), 1e-5));
        assert!(corners[7].abs_diff_eq(Vec3::new(2.0, 2.0, -2.0), 1e-5));
    }

    #[test]
    fn test_directional_cascade_contains_sphere_center() {
        let lights = [VisibleLight::directional(Vec3::new(0.3, -1.0, 0.2), Vec3::ONE)];
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);

        let split = culling.compute_directional_shadow_matrices(0, 0, 4, Vec3::new(0.1, 0.25, 0.5), 256, 0.2);
        let center = split.culling_sphere.truncate();
        let clip = split.projection * split.view * center.extend(1.0);

        assert!(split.culling_sphere.w > 0.0);
        // Sphere center sits in the middle of the tile (within one texel of snapping)
        assert!(clip.x.abs() < 2.0 / 256.0 + 1e-4);
        assert!(clip.y.abs() < 2.0 / 256.0 + 1e-4);
        assert!(clip.z > -1.0 && clip.z < 1.0);
    }

    #[test]
    fn test_texel_snapping_aligns_origin() {
        let lights = [VisibleLight::directional(Vec3::new(0.3, -1.0, 0.2), Vec3::ONE)];
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);

        let split = culling.compute_directional_shadow_matrices(0, 1, 4, Vec3::new(0.1, 0.25, 0.5), 512, 0.0);
        let origin = (split.projection * split.view) * Vec4::W;
        let texel = 2.0 / 512.0;

        let fx = (origin.x / texel).fract().abs();
        assert!(fx < 1e-2 || fx > 1.0 - 1e-2);
    }

    #[test]
    fn test_spot_projection_matches_cone() {
        let lights = [VisibleLight::spot(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 20.0, 30.0, 60.0, Vec3::ONE)];
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);

        let vp = culling.compute_spot_shadow_matrices(0);
        let expected_m00 = 1.0 / 30f32.to_radians().tan();
        assert!((vp.projection.x_axis.x - expected_m00).abs() < 1e-4);

        // A point straight below the light projects to the clip center
        let clip = vp.projection * vp.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((clip.x / clip.w).abs() < 1e-4);
        assert!((clip.y / clip.w).abs() < 1e-4);
    }

    #[test]
    fn test_point_faces_look_outward() {
        let lights = [VisibleLight::point(Vec3::new(1.0, 2.0, 3.0), 10.0, Vec3::ONE)];
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);

        for face in CubemapFace::ALL {
            let (forward, _) = face.basis();
            let vp = culling.compute_point_shadow_matrices(0, face, 0.0);
            let target = lights[0].position() + forward * 5.0;
            let clip = vp.projection * vp.view * target.extend(1.0);
            assert!((clip.x / clip.w).abs() < 1e-4, "{:?}", face);
            assert!((clip.y / clip.w).abs() < 1e-4, "{:?}", face);
        }
    }

    #[test]
    fn test_caster_bounds_from_lights() {
        let bounds = Bounds::new(Vec3::ZERO, Vec3::ONE);
        let lights = [
            VisibleLight::point(Vec3::ZERO, 5.0, Vec3::ONE),
            VisibleLight::point(Vec3::ZERO, 5.0, Vec3::ONE).with_caster_bounds(bounds),
        ];
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);

        assert_eq!(culling.caster_bounds(0), None);
        assert_eq!(culling.caster_bounds(1), Some(bounds));
        assert_eq!(culling.caster_bounds(7), None);
    }
}
