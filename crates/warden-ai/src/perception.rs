//! Perception and targeting helpers.
//!
//! Visibility and attack-range checks are pure queries against the current
//! poses; nothing is cached between ticks. The cover finder picks a hiding
//! point behind an obstacle relative to a threat.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::error;

use warden_common::{EntityId, Pose};

use crate::registry::CoverSpot;
use crate::spatial::SpatialQuery;

/// Sight and reach of an NPC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Perception {
    /// Maximum sight distance (`None` for unbounded)
    pub max_distance: Option<f32>,
    /// Half-angle of the sight cone in degrees
    pub half_angle_deg: f32,
    /// Radius within which the target can be attacked
    pub attack_distance: f32,
}

impl Perception {
    /// Ranged soldier perception.
    #[must_use]
    pub const fn soldier(sight_distance: f32, half_angle_deg: f32, attack_distance: f32) -> Self {
        Self {
            max_distance: Some(sight_distance),
            half_angle_deg,
            attack_distance,
        }
    }

    /// Melee perception: angle-only sight.
    #[must_use]
    pub const fn melee(half_angle_deg: f32, attack_distance: f32) -> Self {
        Self {
            max_distance: None,
            half_angle_deg,
            attack_distance,
        }
    }

    /// Returns true if `target` is inside the sight cone of `observer`.
    #[must_use]
    pub fn is_visible(&self, observer: &Pose, target: Vec3) -> bool {
        let to_target = target - observer.position;
        let distance = to_target.length();
        if self.max_distance.is_some_and(|max| distance >= max) {
            return false;
        }
        if distance <= f32::EPSILON {
            return true;
        }
        angle_between_deg(to_target, observer.forward) < self.half_angle_deg
    }

    /// Returns true if `target` is within attack distance of `observer`.
    #[must_use]
    pub fn is_attackable(&self, observer: &Pose, target: Vec3) -> bool {
        observer.distance_to(target) < self.attack_distance
    }
}

fn angle_between_deg(a: Vec3, b: Vec3) -> f32 {
    match (a.try_normalize(), b.try_normalize()) {
        (Some(a), Some(b)) => a.dot(b).clamp(-1.0, 1.0).acos().to_degrees(),
        _ => 0.0,
    }
}

fn yaw_of(direction: Vec3) -> Option<Quat> {
    let planar = Vec3::new(direction.x, 0.0, direction.z).try_normalize()?;
    Some(Quat::from_rotation_y(planar.x.atan2(planar.z)))
}

/// Rotates `forward` towards `direction` on the XZ plane by fraction `t`.
#[must_use]
pub fn turn_towards(forward: Vec3, direction: Vec3, t: f32) -> Vec3 {
    let Some(target) = yaw_of(direction) else {
        return forward;
    };
    let current = yaw_of(forward).unwrap_or(Quat::IDENTITY);
    current.slerp(target, t.clamp(0.0, 1.0)) * Vec3::Z
}

/// Rotates `position` about the vertical axis through `pivot`.
#[must_use]
pub fn orbit_around(position: Vec3, pivot: Vec3, degrees: f32) -> Vec3 {
    pivot + Quat::from_rotation_y(degrees.to_radians()) * (position - pivot)
}

/// Which cover spot to head for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverPick {
    /// Spot nearest the threat
    Closest,
    /// Spot farthest from the threat
    Farthest,
}

/// Chooses hiding points behind cover spots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverFinder {
    offset: f32,
    last_used: Option<EntityId>,
}

impl CoverFinder {
    /// Creates a finder that hides `offset` beyond the obstacle edge.
    #[must_use]
    pub const fn new(offset: f32) -> Self {
        Self {
            offset,
            last_used: None,
        }
    }

    /// Spot used by the last successful search.
    #[must_use]
    pub const fn last_used(&self) -> Option<EntityId> {
        self.last_used
    }

    /// Selects the spot nearest to or farthest from `threat`.
    ///
    /// The last used spot is skipped unless it is the only one.
    #[must_use]
    pub fn select<'a>(
        &self,
        spots: &'a [CoverSpot],
        threat: Vec3,
        pick: CoverPick,
    ) -> Option<&'a CoverSpot> {
        let candidates = spots
            .iter()
            .filter(|s| spots.len() == 1 || Some(s.id) != self.last_used);
        let by_distance = |a: &&CoverSpot, b: &&CoverSpot| {
            a.position
                .distance(threat)
                .total_cmp(&b.position.distance(threat))
        };
        match pick {
            CoverPick::Closest => candidates.min_by(by_distance),
            CoverPick::Farthest => candidates.max_by(by_distance),
        }
    }

    /// Finds a navigable hiding point behind a cover spot.
    ///
    /// With no spots the current position is returned. With no collider on
    /// the chosen obstacle, or no navigable point behind it, the origin is
    /// returned.
    pub fn hiding_point(
        &mut self,
        spots: &[CoverSpot],
        threat: Vec3,
        current: Vec3,
        pick: CoverPick,
        spatial: &dyn SpatialQuery,
    ) -> Vec3 {
        let Some(spot) = self.select(spots, threat, pick) else {
            error!("No obstacles to hide behind");
            return current;
        };
        let Some(footprint) = spot.footprint else {
            error!(obstacle = %spot.id, "Cover obstacle has no collider");
            return Vec3::ZERO;
        };
        let reach = footprint.x.max(footprint.y) / 2.0 + self.offset;
        let away = (threat - spot.position).normalize_or_zero();
        let candidate = spot.position - away * reach;
        match spatial.sample_nav_point(candidate, reach) {
            Some(point) => {
                self.last_used = Some(spot.id);
                point
            },
            None => {
                error!(obstacle = %spot.id, "Cannot place agent behind cover");
                Vec3::ZERO
            },
        }
    }
}
