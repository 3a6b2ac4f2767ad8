use super::material::Material;
use super::{SceneDescription, SceneObject, SphereCollider, Transform};
use crate::geometry;
use glam::{Quat, Vec3};

/// Ground plane, two boxes, a crystal and a 5x3 grid of spheres from matte to mirror.
pub fn demo_scene() -> SceneDescription {
    let mut scene = SceneDescription::new();

    // Floor
    scene.add_mesh(SceneObject::mesh(
        "floor",
        Transform::from_translation(Vec3::new(0.0, -1.0, 0.0)).with_scale(Vec3::new(40.0, 1.0, 40.0)),
        geometry::plane(),
        Material::new([0.6, 0.6, 0.6]).specular([0.1, 0.1, 0.1]),
    ));

    scene.add_mesh(
        SceneObject::mesh(
            "red box",
            Transform::from_translation(Vec3::new(-4.0, 0.0, -2.0))
                .with_rotation(Quat::from_rotation_y(0.4))
                .with_scale(Vec3::splat(2.0)),
            geometry::cube(),
            Material::new([0.65, 0.05, 0.05]),
        )
        // bounds from the collider: extents of a 2-unit cube
        .with_collider(SphereCollider::new(0.5)),
    );
    scene.add_mesh(SceneObject::mesh(
        "mirror box",
        Transform::from_translation(Vec3::new(4.5, 0.5, -3.0))
            .with_rotation(Quat::from_rotation_y(-0.6))
            .with_scale(Vec3::new(1.0, 3.0, 1.0)),
        geometry::cube(),
        Material::metal([0.9, 0.9, 0.9]),
    ));
    scene.add_mesh(SceneObject::mesh(
        "crystal",
        Transform::from_translation(Vec3::new(0.0, 1.5, -6.0)).with_scale(Vec3::splat(1.5)),
        geometry::crystal(),
        Material::new([0.2, 0.4, 0.8]).specular([0.5, 0.7, 1.0]),
    ));

    for row in 0..3 {
        for col in 0..5 {
            let t = col as f32 / 4.0;
            let hue = [
                Vec3::new(0.9, 0.3, 0.2),
                Vec3::new(0.2, 0.8, 0.3),
                Vec3::new(0.3, 0.4, 0.9),
            ][row];
            let material = Material::new(hue * (1.0 - t)).specular(Vec3::splat(0.04).lerp(Vec3::splat(0.9), t));
            scene.add_sphere(SceneObject::sphere(
                format!("sphere {}-{}", row, col),
                Vec3::new(-4.0 + col as f32 * 2.0, -0.4, 1.5 * row as f32),
                0.6,
                material,
            ));
        }
    }

    scene
}
