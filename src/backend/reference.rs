//! Brute-force CPU tracer honouring the same parameter contract as `shaders/raytrace.wgsl`.
//! Used by headless rendering and as an executable description of what the kernel computes.

use super::host::{HostKernel, ImageView, KernelInputs};
use super::FLAG_HAS_SKYBOX;
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};
use std::f32::consts::PI;

const SURFACE_BIAS: f32 = 1e-3;

#[derive(Debug, Clone, Copy)]
struct Ray {
    origin: Vec3,
    direction: Vec3,
    energy: Vec3,
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    distance: f32,
    position: Vec3,
    normal: Vec3,
    albedo: Vec3,
    specular: Vec3,
}

impl Hit {
    fn miss() -> Self {
        Self {
            distance: f32::INFINITY,
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
            albedo: Vec3::ZERO,
            specular: Vec3::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceKernel;

impl HostKernel for ReferenceKernel {
    fn trace(&self, inputs: &KernelInputs<'_>, x: u32, y: u32) -> [f32; 4] {
        let statics = inputs.statics;
        let light = Vec4::from(statics.directional_light);
        let tint_albedo = Vec4::from(statics.default_albedo).xyz();
        let tint_specular = Vec4::from(statics.default_specular).xyz();
        let shadow = Vec4::from(statics.default_shadow).xyz();

        let mut ray = camera_ray(inputs, x, y);
        let mut result = Vec3::ZERO;

        for _ in 0..=statics.reflect_amount {
            let hit = trace_scene(inputs, &ray);
            if !hit.distance.is_finite() {
                result += ray.energy * sky(inputs, ray.direction);
                break;
            }

            let energy = ray.energy;
            let normal = hit.normal;
            ray.origin = hit.position + normal * SURFACE_BIAS;
            ray.direction = reflect(ray.direction, normal);
            ray.energy = energy * hit.specular * tint_specular;

            let shadow_ray = Ray {
                origin: ray.origin,
                direction: -light.xyz(),
                energy: Vec3::ONE,
            };
            if trace_scene(inputs, &shadow_ray).distance.is_finite() {
                result += energy * shadow;
            } else {
                let lambert = (-normal.dot(light.xyz())).clamp(0.0, 1.0);
                result += energy * lambert * light.w * hit.albedo * tint_albedo;
            }

            if ray.energy.max_element() <= 0.0 {
                break;
            }
        }

        [result.x, result.y, result.z, 1.0]
    }
}

fn camera_ray(inputs: &KernelInputs<'_>, x: u32, y: u32) -> Ray {
    let frame = inputs.frame;
    let block = inputs.statics.pixel_size.max(1);
    let offset = frame.pixel_offset;

    // Pixel-trace profile: every pixel in a block shares the block's sample.
    let sx = (x / block * block) as f32 + offset[0] * block as f32;
    let sy = (y / block * block) as f32 + offset[1] * block as f32;
    let u = sx / inputs.width as f32 * 2.0 - 1.0;
    let v = 1.0 - sy / inputs.height as f32 * 2.0;

    let camera_to_world = Mat4::from_cols_array_2d(&frame.camera_to_world);
    let inverse_projection = Mat4::from_cols_array_2d(&frame.inverse_projection);
    let origin = camera_to_world.transform_point3(Vec3::ZERO);
    let view_dir = (inverse_projection * Vec4::new(u, v, 0.0, 1.0)).xyz();
    let direction = camera_to_world
        .transform_vector3(view_dir)
        .normalize_or_zero();

    Ray {
        origin,
        direction,
        energy: Vec3::ONE,
    }
}

fn trace_scene(inputs: &KernelInputs<'_>, ray: &Ray) -> Hit {
    let mut best = Hit::miss();
    let sphere_count = (inputs.statics.sphere_count as usize).min(inputs.spheres.len());
    for sphere in &inputs.spheres[..sphere_count] {
        let center = Vec3::from(sphere.position);
        if let Some(t) = intersect_sphere(ray, center, sphere.radius) {
            if t < best.distance {
                let position = ray.origin + ray.direction * t;
                best = Hit {
                    distance: t,
                    position,
                    normal: (position - center).normalize_or_zero(),
                    albedo: sphere.albedo.into(),
                    specular: sphere.specular.into(),
                };
            }
        }
    }

    let mesh_count = (inputs.statics.mesh_count as usize).min(inputs.meshes.len());
    for mesh in &inputs.meshes[..mesh_count] {
        if mesh.radius > 0.0 {
            match intersect_sphere_entry(ray, mesh.center.into(), mesh.radius) {
                Some(entry) if entry < best.distance => {}
                _ => continue,
            }
        }
        let transform = Mat4::from_cols_array_2d(&mesh.local_to_world);
        let range = mesh.index_range();
        let Some(indices) = inputs.indices.get(range) else {
            continue;
        };
        for tri in indices.chunks_exact(3) {
            let vertex = |i: u32| {
                inputs
                    .vertices
                    .get(i as usize)
                    .map(|&p| transform.transform_point3(Vec3::from(p)))
            };
            let (Some(v0), Some(v1), Some(v2)) = (vertex(tri[0]), vertex(tri[1]), vertex(tri[2]))
            else {
                continue;
            };
            if let Some(t) = intersect_triangle(ray, v0, v1, v2) {
                if t < best.distance {
                    let mut normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
                    if normal.dot(ray.direction) > 0.0 {
                        normal = -normal;
                    }
                    best = Hit {
                        distance: t,
                        position: ray.origin + ray.direction * t,
                        normal,
                        albedo: mesh.albedo.into(),
                        specular: mesh.specular.into(),
                    };
                }
            }
        }
    }
    best
}

fn intersect_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let d = ray.origin - center;
    let p1 = -ray.direction.dot(d);
    let p2_sqr = p1 * p1 - d.dot(d) + radius * radius;
    if p2_sqr < 0.0 {
        return None;
    }
    let p2 = p2_sqr.sqrt();
    let t = if p1 - p2 > 0.0 { p1 - p2 } else { p1 + p2 };
    (t > 0.0).then_some(t)
}

/// Distance at which the ray enters the sphere, 0 when it starts inside.
fn intersect_sphere_entry(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let d = ray.origin - center;
    if d.length_squared() <= radius * radius {
        return Some(0.0);
    }
    intersect_sphere(ray, center, radius)
}

// Moller-Trumbore, two-sided
fn intersect_triangle(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let pvec = ray.direction.cross(edge2);
    let det = edge1.dot(pvec);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = ray.origin - v0;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(edge1);
    let v = ray.direction.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(qvec) * inv_det;
    (t > EPSILON).then_some(t)
}

fn reflect(direction: Vec3, normal: Vec3) -> Vec3 {
    direction - 2.0 * direction.dot(normal) * normal
}

fn sky(inputs: &KernelInputs<'_>, direction: Vec3) -> Vec3 {
    match inputs.skybox {
        Some(skybox) if inputs.statics.flags & FLAG_HAS_SKYBOX != 0 => {
            sample_equirect(&skybox, direction)
        }
        _ => {
            let t = 0.5 * (direction.y + 1.0);
            Vec3::ONE.lerp(Vec3::new(0.5, 0.7, 1.0), t)
        }
    }
}

fn sample_equirect(skybox: &ImageView<'_>, direction: Vec3) -> Vec3 {
    let theta = direction.y.clamp(-1.0, 1.0).acos() / PI;
    let phi = direction.x.atan2(-direction.z) / (2.0 * PI) + 0.5;
    let x = (phi * skybox.width as f32) as u32;
    let y = (theta * skybox.height as f32) as u32;
    Vec4::from(skybox.load(x, y)).xyz()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ray(origin: Vec3, direction: Vec3) -> Ray {
        Ray {
            origin,
            direction: direction.normalize(),
            energy: Vec3::ONE,
        }
    }

    #[test]
    fn test_sphere_hit_distance() {
        let r = ray(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        assert_eq!(intersect_sphere(&r, Vec3::ZERO, 1.0), Some(4.0));
        assert_eq!(intersect_sphere(&r, Vec3::new(0.0, 3.0, 0.0), 1.0), None);
    }

    #[test]
    fn test_sphere_behind_ray_is_missed() {
        let r = ray(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        assert_eq!(intersect_sphere(&r, Vec3::ZERO, 1.0), None);
        // inside the sphere the exit point counts
        let inside = ray(Vec3::ZERO, Vec3::Z);
        assert_eq!(intersect_sphere(&inside, Vec3::ZERO, 1.0), Some(1.0));
    }

    #[test]
    fn test_triangle_hit_is_two_sided() {
        let (v0, v1, v2) = (
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let front = ray(Vec3::new(0.0, 0.0, 2.0), Vec3::NEG_Z);
        let back = ray(Vec3::new(0.0, 0.0, -3.0), Vec3::Z);
        assert!((intersect_triangle(&front, v0, v1, v2).unwrap() - 2.0).abs() < 1e-6);
        assert!((intersect_triangle(&back, v0, v1, v2).unwrap() - 3.0).abs() < 1e-6);
        let beside = ray(Vec3::new(5.0, 0.0, 2.0), Vec3::NEG_Z);
        assert_eq!(intersect_triangle(&beside, v0, v1, v2), None);
    }

    #[test]
    fn test_reflect_flips_normal_component() {
        let out = reflect(Vec3::new(1.0, -1.0, 0.0), Vec3::Y);
        assert_eq!(out, Vec3::new(1.0, 1.0, 0.0));
    }
}
