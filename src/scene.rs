use std::f32::consts::TAU;

use glam::{Vec2, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::color::hsv_to_rgb;

/// Emissive scale applied to procedurally generated lights.
pub const LIGHT_INTENSITY: f32 = 500.0;

/// Shading model selected by the kernel. The discriminant is the tag written
/// into the `w` component of the material array.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Lambert = 0,
    LambertCheckerboard = 1,
    Metal = 2,
    Dielectric = 3,
    Light = 4,
}

impl MaterialKind {
    /// Lambertian kinds take two slots each so they come up twice as often.
    pub const SAMPLING_TABLE: [MaterialKind; 7] = [
        MaterialKind::Lambert,
        MaterialKind::Lambert,
        MaterialKind::LambertCheckerboard,
        MaterialKind::LambertCheckerboard,
        MaterialKind::Metal,
        MaterialKind::Dielectric,
        MaterialKind::Light,
    ];

    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::SAMPLING_TABLE[rng.gen_range(0..Self::SAMPLING_TABLE.len())]
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    fn sample_color<R: Rng + ?Sized>(self, rng: &mut R) -> Vec3 {
        match self {
            MaterialKind::Lambert | MaterialKind::LambertCheckerboard => {
                hsv_to_rgb(rng.gen_range(180.0..360.0), 0.9, 1.0) * 0.2
            }
            // Not read by the metal/dielectric shading, kept for a uniform layout.
            MaterialKind::Metal | MaterialKind::Dielectric => Vec3::splat(0.9),
            MaterialKind::Light => hsv_to_rgb(rng.gen_range(0.0..360.0), 0.2, 1.0) * LIGHT_INTENSITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub position: Vec3,
    pub radius: f32,

    pub color: Vec3,
    pub material: MaterialKind,
}

impl Default for Sphere {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radius: 0.5,
            color: Vec3::ONE,
            material: MaterialKind::Lambert,
        }
    }
}

impl Sphere {
    /// Huge dark sphere standing in for the floor, always at index 0.
    pub fn ground() -> Self {
        Self {
            position: Vec3::new(0.0, -1000.0, 0.0),
            radius: 1000.0,
            color: Vec3::splat(0.15),
            material: MaterialKind::Lambert,
        }
    }

    /// The "sun" occupying index 1 when it is preserved.
    pub fn reserved_light() -> Self {
        Self {
            position: Vec3::new(10.0, 10.0, 0.0),
            radius: 2.0,
            color: Vec3::splat(800.0),
            material: MaterialKind::Light,
        }
    }

    /// Center projected onto the ground plane.
    pub fn footprint(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }

    pub fn overlaps_footprint(&self, other: &Sphere) -> bool {
        self.footprint().distance(other.footprint()) < self.radius + other.radius
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Scene needs at least {min} spheres, got {count}")]
    TooFewSpheres { count: usize, min: usize },

    #[error("Invalid sphere radius range [{min}, {max}]")]
    InvalidRadiusRange { min: f32, max: f32 },

    #[error("Could not place sphere {index} without overlap after {attempts} attempts")]
    PlacementExhausted { index: usize, attempts: u32 },
}

/// Parameters of the disk the spheres are scattered over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneLayout {
    pub circle_radius: f32,
    pub circle_center: Vec2,
    pub min_sphere_radius: f32,
    pub max_sphere_radius: f32,
    /// Rejection sampling budget per sphere.
    pub max_attempts: u32,
    /// Keep the sun at index 1 instead of overwriting it with a random sphere.
    pub preserve_reserved_light: bool,
}

impl Default for SceneLayout {
    fn default() -> Self {
        Self {
            circle_radius: 15.0,
            circle_center: Vec2::new(-6.0, 0.0),
            min_sphere_radius: 0.5,
            max_sphere_radius: 1.0,
            max_attempts: 10_000,
            preserve_reserved_light: false,
        }
    }
}

impl SceneLayout {
    fn first_random_index(&self) -> usize {
        if self.preserve_reserved_light {
            2
        } else {
            1
        }
    }

    pub fn validate(&self, count: usize) -> Result<(), SceneError> {
        let min = self.first_random_index();
        if count < min {
            return Err(SceneError::TooFewSpheres { count, min });
        }
        let (lo, hi) = (self.min_sphere_radius, self.max_sphere_radius);
        if !(lo > 0.0 && lo <= hi && hi.is_finite()) {
            return Err(SceneError::InvalidRadiusRange { min: lo, max: hi });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub spheres: Vec<Sphere>,
}

impl Scene {
    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    /// Every sphere except the ground.
    pub fn placed(&self) -> &[Sphere] {
        self.spheres.get(1..).unwrap_or_default()
    }

    /// True when no two non-ground footprints intersect.
    pub fn is_overlap_free(&self) -> bool {
        let placed = self.placed();
        placed.iter().enumerate().all(|(i, a)| {
            placed[i + 1..]
                .iter()
                .all(|b| !a.overlaps_footprint(b))
        })
    }
}

/// Fills a fixed-capacity scene with non-overlapping spheres.
#[derive(Debug, Clone)]
pub struct SceneGenerator {
    count: usize,
    layout: SceneLayout,
}

impl SceneGenerator {
    pub fn new(count: usize, layout: SceneLayout) -> Result<Self, SceneError> {
        layout.validate(count)?;
        Ok(Self { count, layout })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn layout(&self) -> &SceneLayout {
        &self.layout
    }

    /// Generate a scene of exactly `count` spheres. Deterministic for a given
    /// random source state.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Scene, SceneError> {
        let mut spheres = Vec::with_capacity(self.count);
        spheres.push(Sphere::ground());
        if self.layout.preserve_reserved_light {
            spheres.push(Sphere::reserved_light());
        }

        let mut total_attempts = 0u64;
        while spheres.len() < self.count {
            let index = spheres.len();
            let radius = rng.gen_range(self.layout.min_sphere_radius..=self.layout.max_sphere_radius);
            let (center, attempts) = self.place(rng, radius, &spheres[1..]).ok_or(
                SceneError::PlacementExhausted {
                    index,
                    attempts: self.layout.max_attempts,
                },
            )?;
            total_attempts += u64::from(attempts);

            let material = MaterialKind::sample(rng);
            let color = material.sample_color(rng);
            spheres.push(Sphere {
                position: Vec3::new(center.x, radius, center.y),
                radius,
                color,
                material,
            });
        }

        tracing::debug!(count = spheres.len(), total_attempts, "scene generated");
        Ok(Scene { spheres })
    }

    /// Rejection-sample a ground-plane center clear of every placed sphere.
    fn place<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        radius: f32,
        placed: &[Sphere],
    ) -> Option<(Vec2, u32)> {
        for attempt in 1..=self.layout.max_attempts {
            let angle = rng.gen_range(0.0..TAU);
            let distance = rng.gen::<f32>() * self.layout.circle_radius;
            let center = self.layout.circle_center + Vec2::new(angle.sin(), angle.cos()) * distance;

            let clear = placed
                .iter()
                .all(|other| other.footprint().distance(center) >= other.radius + radius);
            if clear {
                return Some((center, attempt));
            }
        }
        None
    }
}

/// Scene packed as the kernel expects it: `positions[N]` (xyz center, w
/// radius) followed by `materials[N]` (rgb color, w kind tag).
/// Bytes a sphere occupies in the scene uniform: one position and one
/// material `vec4<f32>`.
pub const SPHERE_STRIDE: u64 = 32;

#[derive(Debug, Clone)]
pub struct SceneBuffer {
    data: Vec<[f32; 4]>,
}

impl SceneBuffer {
    pub fn new(scene: &Scene) -> Self {
        let positions = scene
            .spheres
            .iter()
            .map(|s| s.position.extend(s.radius).to_array());
        let materials = scene
            .spheres
            .iter()
            .map(|s| s.color.extend(s.material.code() as f32).to_array());
        Self {
            data: positions.chain(materials).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len() / 2
    }

    pub fn positions(&self) -> &[[f32; 4]] {
        &self.data[..self.capacity()]
    }

    pub fn materials(&self) -> &[[f32; 4]] {
        &self.data[self.capacity()..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn generator(count: usize) -> SceneGenerator {
        SceneGenerator::new(count, SceneLayout::default()).unwrap()
    }

    #[test]
    fn ground_is_first_and_fixed() {
        let scene = generator(10).generate(&mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(scene.len(), 10);
        assert_eq!(scene.spheres[0], Sphere::ground());
    }

    #[test]
    fn generated_scenes_never_overlap() {
        let generator = generator(75);
        for seed in 0..20 {
            let scene = generator.generate(&mut StdRng::seed_from_u64(seed)).unwrap();
            assert!(scene.is_overlap_free(), "overlap with seed {seed}");
            for sphere in scene.placed() {
                assert!((0.5..=1.0).contains(&sphere.radius));
                assert_eq!(sphere.position.y, sphere.radius);
                let offset = sphere.footprint() - Vec2::new(-6.0, 0.0);
                assert!(offset.length() <= 15.0 + 1e-3);
            }
        }
    }

    #[test]
    fn same_seed_same_scene() {
        let generator = generator(75);
        let first = generator.generate(&mut StdRng::seed_from_u64(42)).unwrap();
        let second = generator.generate(&mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(first, second);

        let other = generator.generate(&mut StdRng::seed_from_u64(43)).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn reserved_light_survives_when_preserved() {
        let layout = SceneLayout {
            preserve_reserved_light: true,
            ..Default::default()
        };
        let scene = SceneGenerator::new(30, layout)
            .unwrap()
            .generate(&mut StdRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(scene.spheres[1], Sphere::reserved_light());
        assert!(scene.is_overlap_free());
    }

    #[test]
    fn reserved_light_is_overwritten_by_default() {
        let scene = generator(5).generate(&mut StdRng::seed_from_u64(5)).unwrap();
        assert_ne!(scene.spheres[1], Sphere::reserved_light());
    }

    #[test]
    fn crowded_disk_reports_exhaustion() {
        let layout = SceneLayout {
            circle_radius: 0.0,
            max_attempts: 50,
            ..Default::default()
        };
        let result = SceneGenerator::new(3, layout)
            .unwrap()
            .generate(&mut StdRng::seed_from_u64(9));
        assert_eq!(
            result,
            Err(SceneError::PlacementExhausted {
                index: 2,
                attempts: 50
            })
        );
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert_eq!(
            SceneGenerator::new(0, SceneLayout::default()).unwrap_err(),
            SceneError::TooFewSpheres { count: 0, min: 1 }
        );
        let preserved = SceneLayout {
            preserve_reserved_light: true,
            ..Default::default()
        };
        assert!(SceneGenerator::new(1, preserved).is_err());
        let inverted = SceneLayout {
            min_sphere_radius: 1.0,
            max_sphere_radius: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            SceneGenerator::new(4, inverted),
            Err(SceneError::InvalidRadiusRange { .. })
        ));
    }

    #[test]
    fn material_sampling_favours_lambert() {
        let mut rng = StdRng::seed_from_u64(1234);
        let draws = 70_000;
        let mut counts = [0usize; 5];
        for _ in 0..draws {
            counts[MaterialKind::sample(&mut rng).code() as usize] += 1;
        }
        let ratio = |n: usize| n as f64 / draws as f64;
        // 4 sigma for p = 1/7 at this sample size is about 0.0053.
        assert!((ratio(counts[0] + counts[1]) - 4.0 / 7.0).abs() < 0.008);
        for &kind in &counts[2..] {
            assert!((ratio(kind) - 1.0 / 7.0).abs() < 0.008);
        }
    }

    #[test]
    fn material_colors_follow_kind() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let lambert = MaterialKind::Lambert.sample_color(&mut rng);
            assert!(lambert.max_element() <= 0.2 + 1e-5);
            let light = MaterialKind::Light.sample_color(&mut rng);
            assert!(light.max_element() > 400.0);
        }
        assert_eq!(MaterialKind::Metal.sample_color(&mut rng), Vec3::splat(0.9));
    }

    #[test]
    fn buffer_packs_positions_then_materials() {
        let scene = generator(4).generate(&mut StdRng::seed_from_u64(8)).unwrap();
        let buffer = SceneBuffer::new(&scene);
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.as_bytes().len() as u64, 4 * SPHERE_STRIDE);
        assert_eq!(buffer.positions()[0], [0.0, -1000.0, 0.0, 1000.0]);
        for (sphere, material) in scene.spheres.iter().zip(buffer.materials()) {
            assert_eq!(material[3], sphere.material.code() as f32);
        }
    }
}
