//! Minimal built-in physics world
//!
//! Integrates dynamic bodies with semi-implicit Euler under constant gravity
//! and reports overlapping bounding spheres. A pair is reported once when it
//! starts overlapping and again only after it has separated.

use std::collections::{HashMap, HashSet};

use super::{BodyDesc, BodyHandle, BodyKind, CollisionEvent, PhysicsWorld};
use crate::foundation::math::{Quat, Vec3};

#[derive(Debug, Clone)]
struct Body {
    desc: BodyDesc,
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
}

/// Pair of bodies, smaller handle first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Pair(BodyHandle, BodyHandle);

impl Pair {
    fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a < b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

/// Sphere-overlap physics world
#[derive(Debug)]
pub struct SphereWorld {
    gravity: Vec3,
    bodies: HashMap<BodyHandle, Body>,
    next_handle: u64,
    current_pairs: HashSet<Pair>,
    previous_pairs: HashSet<Pair>,
    events: Vec<CollisionEvent>,
}

impl Default for SphereWorld {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -9.81, 0.0))
    }
}

impl SphereWorld {
    /// Create a world with the given gravity
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity,
            bodies: HashMap::new(),
            next_handle: 0,
            current_pairs: HashSet::new(),
            previous_pairs: HashSet::new(),
            events: Vec::new(),
        }
    }

    /// Number of live bodies
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Linear velocity of a body
    pub fn velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&handle).map(|body| body.velocity)
    }

    fn integrate(&mut self, delta_time: f32) {
        for body in self.bodies.values_mut() {
            if body.desc.kind != BodyKind::Dynamic {
                continue;
            }
            body.velocity += self.gravity * delta_time;
            body.position += body.velocity * delta_time;
        }
    }

    fn detect(&mut self) {
        std::mem::swap(&mut self.current_pairs, &mut self.previous_pairs);
        self.current_pairs.clear();

        let mut handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();
        handles.sort();

        for (i, a) in handles.iter().enumerate() {
            for b in &handles[i + 1..] {
                let (Some(body_a), Some(body_b)) = (self.bodies.get(a), self.bodies.get(b)) else {
                    continue;
                };
                if body_a.desc.kind != BodyKind::Dynamic && body_b.desc.kind != BodyKind::Dynamic {
                    continue;
                }

                let offset = body_b.position - body_a.position;
                let distance = offset.norm();
                let radius_a = body_a.desc.shape.bounding_radius();
                let radius_b = body_b.desc.shape.bounding_radius();
                let depth = radius_a + radius_b - distance;
                if depth < 0.0 {
                    continue;
                }

                let pair = Pair::new(*a, *b);
                self.current_pairs.insert(pair);
                if self.previous_pairs.contains(&pair) {
                    continue;
                }

                let normal = if distance > f32::EPSILON { offset / distance } else { Vec3::y() };
                self.events.push(CollisionEvent {
                    a: *a,
                    b: *b,
                    point: body_a.position + normal * (radius_a - depth * 0.5),
                    normal,
                    depth,
                });
            }
        }
    }
}

impl PhysicsWorld for SphereWorld {
    fn add_body(&mut self, desc: &BodyDesc, position: Vec3, rotation: Quat) -> BodyHandle {
        self.next_handle += 1;
        let handle = BodyHandle(self.next_handle);
        self.bodies.insert(
            handle,
            Body { desc: *desc, position, rotation, velocity: desc.velocity },
        );
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        self.bodies.remove(&handle);
        self.current_pairs.retain(|pair| pair.0 != handle && pair.1 != handle);
    }

    fn set_body_pose(&mut self, handle: BodyHandle, position: Vec3, rotation: Quat) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.position = position;
            body.rotation = rotation;
        }
    }

    fn body_pose(&self, handle: BodyHandle) -> Option<(Vec3, Quat)> {
        self.bodies.get(&handle).map(|body| (body.position, body.rotation))
    }

    fn step(&mut self, delta_time: f32) {
        if delta_time <= 0.0 {
            return;
        }
        self.integrate(delta_time);
        self.detect();
    }

    fn drain_collisions(&mut self) -> Vec<CollisionEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dynamic_body_falls() {
        let mut world = SphereWorld::default();
        let body = world.add_body(&BodyDesc::sphere(0.5, 1.0), Vec3::new(0.0, 10.0, 0.0), Quat::identity());
        world.step(0.5);
        let position = world.body_pose(body).map(|(p, _)| p).unwrap_or_default();
        // v = -4.905 after the step, x = 10 + v * dt
        assert_relative_eq!(position.y, 10.0 - 9.81 * 0.25, epsilon = 1e-4);
    }

    #[test]
    fn test_static_body_stays_put() {
        let mut world = SphereWorld::default();
        let floor = world.add_body(&BodyDesc::fixed_box(Vec3::new(5.0, 0.5, 5.0)), Vec3::zeros(), Quat::identity());
        world.step(1.0);
        assert_eq!(world.body_pose(floor).map(|(p, _)| p), Some(Vec3::zeros()));
    }

    #[test]
    fn test_overlap_reported_once_until_separated() {
        let mut world = SphereWorld::new(Vec3::zeros());
        let a = world.add_body(&BodyDesc::sphere(1.0, 1.0), Vec3::zeros(), Quat::identity());
        let b = world.add_body(&BodyDesc::sphere(1.0, 1.0), Vec3::new(1.5, 0.0, 0.0), Quat::identity());

        world.step(0.1);
        let events = world.drain_collisions();
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].a, events[0].b), (a, b));
        assert_relative_eq!(events[0].depth, 0.5, epsilon = 1e-5);
        assert_relative_eq!(events[0].normal, Vec3::x(), epsilon = 1e-5);

        world.step(0.1);
        assert!(world.drain_collisions().is_empty());

        world.set_body_pose(b, Vec3::new(5.0, 0.0, 0.0), Quat::identity());
        world.step(0.1);
        world.set_body_pose(b, Vec3::new(1.0, 0.0, 0.0), Quat::identity());
        world.step(0.1);
        assert_eq!(world.drain_collisions().len(), 1);
    }
}
