//! World queries: the core's only view of the arena geometry.
//!
//! Spawn safety, perception, cover finding and shot blocking all go through
//! [`WorldQuery`], which a physics/scene collaborator can implement. The
//! built-in [`ArenaMap`] is a flat arena with circular obstacles, enough to
//! run headless matches.

use glam::Vec2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Axis-aligned play area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Clamp `p` so a body of `margin` radius stays inside
    pub fn clamp(&self, p: Vec2, margin: f32) -> Vec2 {
        let lo = self.min + Vec2::splat(margin);
        let hi = (self.max - Vec2::splat(margin)).max(lo);
        p.clamp(lo, hi)
    }
}

/// A circular obstacle: blocks movement, sight and shots
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub center: Vec2,
    pub radius: f32,
}

/// Ray against circle. `direction` must be normalized. Returns the distance
/// to the entry point (0 when the origin is inside) and the ray's closest
/// approach to the centre.
pub fn ray_circle(origin: Vec2, direction: Vec2, center: Vec2, radius: f32) -> Option<(f32, f32)> {
    let to_center = center - origin;
    let along = to_center.dot(direction);
    let perp_sq = (to_center.length_squared() - along * along).max(0.0);
    let r_sq = radius * radius;
    if perp_sq > r_sq {
        return None;
    }
    let half_chord = (r_sq - perp_sq).sqrt();
    let exit = along + half_chord;
    if exit < 0.0 {
        return None;
    }
    let entry = (along - half_chord).max(0.0);
    Some((entry, perp_sq.sqrt()))
}

/// Spatial queries the simulation needs from the world
pub trait WorldQuery: Send + Sync {
    fn name(&self) -> &str;

    fn bounds(&self) -> Bounds;

    fn spawn_points(&self) -> &[Vec2];

    fn cover_points(&self) -> &[Vec2];

    /// Distance along the ray to the first obstacle within `max_distance`
    fn obstacle_distance(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> Option<f32>;

    /// Push a body of `radius` out of obstacles and back inside the bounds
    fn resolve_position(&self, position: Vec2, radius: f32) -> Vec2;

    /// A random point within `radius` of `center` that a body can stand on
    fn random_reachable_point(&self, center: Vec2, radius: f32, rng: &mut ChaCha8Rng) -> Vec2;

    fn line_of_sight(&self, from: Vec2, to: Vec2) -> bool {
        let delta = to - from;
        let distance = delta.length();
        if distance <= f32::EPSILON {
            return true;
        }
        self.obstacle_distance(from, delta / distance, distance).is_none()
    }

    fn nearest_cover(&self, from: Vec2) -> Option<Vec2> {
        self.cover_points()
            .iter()
            .copied()
            .min_by(|a, b| a.distance_squared(from).total_cmp(&b.distance_squared(from)))
    }
}

/// Built-in arena map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaMap {
    pub name: String,
    pub bounds: Bounds,
    pub obstacles: Vec<Obstacle>,
    pub spawn_points: Vec<Vec2>,
    pub cover_points: Vec<Vec2>,
}

impl ArenaMap {
    fn inside_obstacle(&self, p: Vec2, margin: f32) -> bool {
        self.obstacles
            .iter()
            .any(|o| o.center.distance(p) < o.radius + margin)
    }

    /// 100×100 industrial arena, four pillars and a central block
    pub fn foundry() -> Self {
        let pillars = [
            Vec2::new(-25.0, -25.0),
            Vec2::new(25.0, -25.0),
            Vec2::new(-25.0, 25.0),
            Vec2::new(25.0, 25.0),
        ];
        let mut obstacles: Vec<Obstacle> = pillars
            .iter()
            .map(|&center| Obstacle { center, radius: 4.0 })
            .collect();
        obstacles.push(Obstacle {
            center: Vec2::ZERO,
            radius: 8.0,
        });

        let mut spawn_points = Vec::new();
        for i in 0..12 {
            let angle = i as f32 / 12.0 * std::f32::consts::TAU;
            spawn_points.push(Vec2::new(angle.cos(), angle.sin()) * 42.0);
        }
        for &p in &pillars {
            // outside corner of each pillar
            spawn_points.push(p * 1.5);
        }

        // cover on the far side of each pillar from the centre
        let cover_points = pillars
            .iter()
            .map(|&p| p + p.normalize() * 6.0)
            .chain([
                Vec2::new(0.0, 11.0),
                Vec2::new(0.0, -11.0),
                Vec2::new(11.0, 0.0),
                Vec2::new(-11.0, 0.0),
            ])
            .collect();

        Self {
            name: "foundry".to_string(),
            bounds: Bounds::new(Vec2::splat(-50.0), Vec2::splat(50.0)),
            obstacles,
            spawn_points,
            cover_points,
        }
    }

    /// Small open range for training
    pub fn proving_ground() -> Self {
        Self {
            name: "proving_ground".to_string(),
            bounds: Bounds::new(Vec2::splat(-20.0), Vec2::splat(20.0)),
            obstacles: vec![Obstacle {
                center: Vec2::new(0.0, 8.0),
                radius: 2.0,
            }],
            spawn_points: vec![
                Vec2::new(0.0, -15.0),
                Vec2::new(-15.0, 0.0),
                Vec2::new(15.0, 0.0),
                Vec2::new(0.0, 15.0),
            ],
            cover_points: vec![Vec2::new(0.0, 11.0)],
        }
    }
}

impl WorldQuery for ArenaMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn spawn_points(&self) -> &[Vec2] {
        &self.spawn_points
    }

    fn cover_points(&self) -> &[Vec2] {
        &self.cover_points
    }

    fn obstacle_distance(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> Option<f32> {
        self.obstacles
            .iter()
            .filter_map(|o| ray_circle(origin, direction, o.center, o.radius))
            .map(|(distance, _)| distance)
            .filter(|&d| d <= max_distance)
            .min_by(f32::total_cmp)
    }

    fn resolve_position(&self, position: Vec2, radius: f32) -> Vec2 {
        let mut p = position;
        for o in &self.obstacles {
            let offset = p - o.center;
            let min_distance = o.radius + radius;
            let distance = offset.length();
            if distance < min_distance {
                let normal = if distance > 1e-4 { offset / distance } else { Vec2::X };
                p = o.center + normal * min_distance;
            }
        }
        self.bounds.clamp(p, radius)
    }

    fn random_reachable_point(&self, center: Vec2, radius: f32, rng: &mut ChaCha8Rng) -> Vec2 {
        for _ in 0..8 {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let distance = rng.gen_range(0.0..=radius.max(0.0));
            let candidate = self
                .bounds
                .clamp(center + Vec2::new(angle.cos(), angle.sin()) * distance, 1.0);
            if !self.inside_obstacle(candidate, 1.0) {
                return candidate;
            }
        }
        self.resolve_position(center, 1.0)
    }
}

/// Registry of maps by name; external collaborators can register their own
/// [`WorldQuery`] implementations.
#[derive(Clone)]
pub struct MapCatalog {
    maps: BTreeMap<String, Arc<dyn WorldQuery>>,
}

impl MapCatalog {
    pub fn empty() -> Self {
        Self {
            maps: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, world: Arc<dyn WorldQuery>) {
        self.maps.insert(name.into(), world);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn WorldQuery>> {
        self.maps.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }
}

impl Default for MapCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        for map in [ArenaMap::foundry(), ArenaMap::proving_ground()] {
            catalog.register(map.name.clone(), Arc::new(map));
        }
        catalog
    }
}
