//! Mobility capability.
//!
//! The core never plans paths. It asks a navigation agent to head for a
//! point, reads back path status, and nudges the agent directly for the
//! close-quarters moves (stepping in to strike, backing off).

use glam::Vec3;

/// Navigation agent attached to one entity.
pub trait Navigation {
    /// Current agent position.
    fn position(&self) -> Vec3;

    /// Requests a path to `point`. Returns false if the request was rejected.
    fn set_destination(&mut self, point: Vec3) -> bool;

    /// Distance left along the current path.
    fn remaining_distance(&self) -> f32;

    /// Distance at which the agent considers itself arrived.
    fn stopping_distance(&self) -> f32;

    /// Sets the arrival distance.
    fn set_stopping_distance(&mut self, distance: f32);

    /// Returns true while the agent follows a computed path.
    fn has_path(&self) -> bool;

    /// Returns true while a path request is still being computed.
    fn path_pending(&self) -> bool {
        false
    }

    /// Returns true if movement is halted.
    fn is_stopped(&self) -> bool;

    /// Halts or resumes movement.
    fn set_stopped(&mut self, stopped: bool);

    /// Returns true if the agent participates in navigation.
    fn is_enabled(&self) -> bool;

    /// Enables or disables the agent.
    fn set_enabled(&mut self, enabled: bool);

    /// Current travel speed.
    fn speed(&self) -> f32;

    /// Sets the travel speed.
    fn set_speed(&mut self, speed: f32);

    /// Drops the current path.
    fn reset_path(&mut self);

    /// Moves the agent by `offset` without path planning.
    fn move_by(&mut self, offset: Vec3);

    /// Teleports the agent.
    fn warp(&mut self, position: Vec3);

    /// Returns true once the agent is within stopping distance of its goal.
    fn has_arrived(&self) -> bool {
        !self.path_pending() && self.remaining_distance() <= self.stopping_distance()
    }
}
