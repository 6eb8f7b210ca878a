// Scene description uploaded to the compute shader
//
// Records are `#[repr(C)]` and laid out to match the shader's std430
// structs (vec3 + scalar pairs, 32 bytes each), so they are uploaded
// with a plain byte copy.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// How a surface interacts with light. The discriminant is the code the shader reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MaterialKind {
    Diffuse = 1,
    Reflective = 2,
    // Understood by raytrace.comp; the default room has no glass
    #[allow(dead_code)]
    Refractive = 3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub color: Vec3,
    pub kind: MaterialKind,
}

impl Material {
    pub const fn new(color: Vec3, kind: MaterialKind) -> Self {
        Self { color, kind }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    pub position: Vec3,
    pub radius: f32,
    pub color: Vec3,
    pub material_type: i32,
}

impl Sphere {
    pub fn new(position: Vec3, radius: f32, material: Material) -> Self {
        Self {
            position,
            radius,
            color: material.color,
            material_type: material.kind as i32,
        }
    }
}

/// Infinite plane satisfying `dot(p, normal) + distance == 0`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
    pub color: Vec3,
    pub material_type: i32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32, material: Material) -> Self {
        Self {
            normal,
            distance,
            color: material.color,
            material_type: material.kind as i32,
        }
    }
}

/// Per-frame uniform block (`binding = 3`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct FrameUniform {
    /// Seconds since the renderer started
    pub time: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub spheres: Vec<Sphere>,
    pub planes: Vec<Plane>,
}

impl Scene {
    /// Closed room with a reflective and a diffuse sphere.
    pub fn default_room() -> Self {
        let grey = Material::new(Vec3::new(0.8, 0.8, 0.8), MaterialKind::Diffuse);

        let spheres = vec![
            Sphere::new(
                Vec3::new(-0.55, -1.55, -4.0),
                1.0,
                Material::new(Vec3::new(0.3, 0.9, 0.76), MaterialKind::Reflective),
            ),
            Sphere::new(
                Vec3::new(1.3, 1.2, -4.2),
                0.8,
                Material::new(Vec3::new(0.062, 0.917, 0.078), MaterialKind::Diffuse),
            ),
        ];

        let planes = vec![
            // floor
            Plane::new(Vec3::Y, 2.5, grey),
            // back wall
            Plane::new(Vec3::Z, 5.5, grey),
            Plane::new(
                Vec3::X,
                2.75,
                Material::new(Vec3::new(1.0, 0.250, 0.019), MaterialKind::Diffuse),
            ),
            Plane::new(
                Vec3::NEG_X,
                2.75,
                Material::new(Vec3::new(0.007, 0.580, 0.8), MaterialKind::Diffuse),
            ),
            // ceiling
            Plane::new(Vec3::NEG_Y, 3.0, grey),
            // behind the camera
            Plane::new(Vec3::NEG_Z, 0.5, grey),
        ];

        Self { spheres, planes }
    }

    pub fn sphere_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.spheres)
    }

    pub fn plane_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.planes)
    }
}
