/// Per-agent path following.
///
/// ```text
///  Idle ──begin_request──▶ Requesting ──on_path_result──▶ Following
///   ▲                          │  (nothing to follow)        │
///   └──────────────────────────┴──── arrived / stop / abort ─┘
/// ```
///
/// The follower never touches collision. Each update writes a desired
/// velocity to the avoidance collaborator; the caller moves the agent with
/// whatever velocity the collaborator hands back.

use bevy::prelude::*;

use crate::nav::arrival::{resolve_arrival, ArrivalResolution, ArrivalSearch};
use crate::nav::config::{FollowerConfig, SizeClass};
use crate::nav::grid::NavGrid;
use crate::nav::math::planar;
use crate::nav::oracles::{AgentId, AvoidanceAgent, OccupancyOracle};
use crate::nav::pathfinding::{PathResult, PathStatus, RequestId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FollowerState {
    #[default]
    Idle,
    /// Waiting on a queued path request.
    Requesting,
    Following,
}

/// What the caller must act on after an update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FollowEvent {
    None,
    Arrived,
    /// Queue a fresh request to this destination and hand its id to
    /// [`AgentFollower::begin_repath`].
    NeedsRepath(Vec3),
    /// Gave up after too many repaths.
    Aborted,
}

/// Everything an update reads besides the agent's own state.
pub struct FollowContext<'a> {
    pub grid: &'a NavGrid,
    pub occupancy: &'a dyn OccupancyOracle,
    pub agent: Option<AgentId>,
    pub size_class: SizeClass,
    pub radius: f32,
    pub speed: f32,
    pub dt: f32,
    pub config: &'a FollowerConfig,
    pub arrival: &'a ArrivalSearch,
}

#[derive(Component, Clone, Debug, Default)]
pub struct AgentFollower {
    state: FollowerState,
    request: Option<RequestId>,
    destination: Vec3,
    waypoints: Vec<Vec3>,
    next: usize,
    partial: bool,
    arrival_checked: bool,
    repaths: u32,
    stuck_anchor: Option<Vec3>,
    stuck_timer: f32,
}

impl AgentFollower {
    pub fn state(&self) -> FollowerState {
        self.state
    }

    pub fn request(&self) -> Option<RequestId> {
        self.request
    }

    pub fn destination(&self) -> Vec3 {
        self.destination
    }

    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    /// Waypoint currently steered toward, if following.
    pub fn current_waypoint(&self) -> Option<Vec3> {
        match self.state {
            FollowerState::Following => self.waypoints.get(self.next).copied(),
            _ => None,
        }
    }

    pub fn repaths(&self) -> u32 {
        self.repaths
    }

    fn pending_request(&self) -> Option<RequestId> {
        match self.state {
            FollowerState::Requesting => self.request,
            _ => None,
        }
    }

    fn clear_path(&mut self) {
        self.waypoints.clear();
        self.next = 0;
        self.partial = false;
        self.arrival_checked = false;
        self.stuck_anchor = None;
        self.stuck_timer = 0.0;
    }

    /// Start waiting on `id` for a new destination.
    ///
    /// Returns the request this one supersedes, which the caller should cancel.
    pub fn begin_request(&mut self, id: RequestId, destination: Vec3) -> Option<RequestId> {
        let superseded = self.pending_request();
        self.clear_path();
        self.state = FollowerState::Requesting;
        self.request = Some(id);
        self.destination = destination;
        self.repaths = 0;
        superseded
    }

    /// Like [`AgentFollower::begin_request`] but keeps the destination and repath count.
    pub fn begin_repath(&mut self, id: RequestId) -> Option<RequestId> {
        let superseded = self.pending_request();
        self.clear_path();
        self.state = FollowerState::Requesting;
        self.request = Some(id);
        superseded
    }

    /// Accept a delivered result. Results for any other request are stale and ignored.
    ///
    /// Returns whether the result was accepted.
    pub fn on_path_result(&mut self, result: &PathResult) -> bool {
        if self.state != FollowerState::Requesting || self.request != Some(result.request_id) {
            return false;
        }
        self.request = None;
        self.clear_path();

        if result.is_followable() {
            self.waypoints = result.waypoints.clone();
            // The first waypoint is the start cell's centre; skip it.
            self.next = 1.min(self.waypoints.len() - 1);
            self.partial = result.status == PathStatus::Partial;
            self.state = FollowerState::Following;
        } else {
            debug!(
                "[FOLLOWER] Request {:?} came back {:?}; going idle",
                result.request_id, result.status
            );
            self.state = FollowerState::Idle;
        }
        true
    }

    /// Stop immediately. Returns a still-pending request to cancel.
    pub fn stop(&mut self) -> Option<RequestId> {
        let superseded = self.pending_request();
        self.clear_path();
        self.state = FollowerState::Idle;
        self.request = None;
        self.repaths = 0;
        superseded
    }

    /// Advance one step from `position`.
    pub fn update<A: AvoidanceAgent + ?Sized>(
        &mut self,
        position: Vec3,
        ctx: &FollowContext,
        avoidance: &mut A,
    ) -> FollowEvent {
        if self.state != FollowerState::Following || self.waypoints.is_empty() {
            avoidance.set_desired_velocity(Vec3::ZERO);
            return FollowEvent::None;
        }
        let cfg = ctx.config;
        let here = planar(position);
        let last = self.waypoints.len() - 1;

        while self.next < last && here.distance(planar(self.waypoints[self.next])) <= cfg.waypoint_radius {
            self.next += 1;
        }

        let final_distance = here.distance(planar(self.waypoints[last]));
        if !self.partial && !self.arrival_checked && final_distance <= cfg.arrival_check_distance {
            self.arrival_checked = true;
            // Waypoints are cell centres; finish on the exact point when it shares the goal cell.
            let goal_cell = ctx.grid.world_to_cell_checked(self.waypoints[last]);
            if goal_cell.is_some() && goal_cell == ctx.grid.world_to_cell_checked(self.destination) {
                self.waypoints[last] = self.destination;
            }
            let resolution = resolve_arrival(
                self.waypoints[last],
                ctx.radius,
                ctx.grid,
                ctx.size_class,
                ctx.occupancy,
                ctx.agent,
                ctx.arrival,
            );
            if let ArrivalResolution::Relocated(free) = resolution {
                self.waypoints[last] = free;
                self.destination = free;
            }
        }

        if self.next == last && here.distance(planar(self.waypoints[last])) <= cfg.arrival_threshold {
            avoidance.set_desired_velocity(Vec3::ZERO);
            if self.partial {
                // End of a best-effort path: try again from here.
                return self.repath_or_abort(cfg.max_repaths);
            }
            self.clear_path();
            self.state = FollowerState::Idle;
            self.repaths = 0;
            return FollowEvent::Arrived;
        }

        if self.is_stuck(position, ctx.dt, cfg) {
            avoidance.set_desired_velocity(Vec3::ZERO);
            return self.repath_or_abort(cfg.max_repaths);
        }

        let target = self.waypoints[self.next];
        let to_target = planar(target) - here;
        let distance = to_target.length();
        let mut speed = ctx.speed;
        if self.next == last && ctx.dt > 0.0 {
            speed = speed.min(distance / ctx.dt);
        }
        let dir = to_target.normalize_or_zero();
        avoidance.set_desired_velocity(Vec3::new(dir.x, 0.0, dir.y) * speed);
        FollowEvent::None
    }

    fn is_stuck(&mut self, position: Vec3, dt: f32, cfg: &FollowerConfig) -> bool {
        let Some(anchor) = self.stuck_anchor else {
            self.stuck_anchor = Some(position);
            self.stuck_timer = 0.0;
            return false;
        };
        self.stuck_timer += dt;
        if self.stuck_timer < cfg.stuck_time {
            return false;
        }
        if planar(position).distance(planar(anchor)) < cfg.stuck_distance {
            return true;
        }
        self.stuck_anchor = Some(position);
        self.stuck_timer = 0.0;
        false
    }

    fn repath_or_abort(&mut self, max_repaths: u32) -> FollowEvent {
        self.clear_path();
        self.request = None;
        if self.repaths >= max_repaths {
            warn!(
                "[FOLLOWER] Giving up on {:?} after {} repaths",
                self.destination, self.repaths
            );
            self.state = FollowerState::Idle;
            self.repaths = 0;
            return FollowEvent::Aborted;
        }
        self.repaths += 1;
        self.state = FollowerState::Requesting;
        FollowEvent::NeedsRepath(self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::components::AgentVelocity;
    use crate::nav::config::GridConfig;
    use crate::nav::oracles::NoOccupancy;

    struct Fixture {
        grid: NavGrid,
        config: FollowerConfig,
        arrival: ArrivalSearch,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                grid: NavGrid::new(GridConfig {
                    width: 32,
                    height: 32,
                    ..Default::default()
                }),
                config: FollowerConfig::default(),
                arrival: ArrivalSearch::default(),
            }
        }

        fn ctx<'a>(&'a self, occupancy: &'a dyn OccupancyOracle, dt: f32) -> FollowContext<'a> {
            FollowContext {
                grid: &self.grid,
                occupancy,
                agent: Some(AgentId(1)),
                size_class: SizeClass::Small,
                radius: 0.5,
                speed: 2.0,
                dt,
                config: &self.config,
                arrival: &self.arrival,
            }
        }
    }

    fn found(id: u64, waypoints: Vec<Vec3>) -> PathResult {
        PathResult {
            waypoints,
            ..PathResult::empty(RequestId(id), PathStatus::Found)
        }
    }

    fn walk(
        follower: &mut AgentFollower,
        position: &mut Vec3,
        ctx: &FollowContext,
        velocity: &mut AgentVelocity,
        max_steps: usize,
    ) -> FollowEvent {
        for _ in 0..max_steps {
            let event = follower.update(*position, ctx, velocity);
            if event != FollowEvent::None {
                return event;
            }
            *position += velocity.velocity() * ctx.dt;
        }
        FollowEvent::None
    }

    #[test]
    fn test_stale_results_are_ignored() {
        let mut follower = AgentFollower::default();
        assert_eq!(follower.begin_request(RequestId(1), Vec3::new(5.0, 0.0, 5.0)), None);
        assert_eq!(follower.begin_request(RequestId(2), Vec3::new(6.0, 0.0, 6.0)), Some(RequestId(1)));

        assert!(!follower.on_path_result(&found(1, vec![Vec3::ZERO, Vec3::X])));
        assert_eq!(follower.state(), FollowerState::Requesting);

        assert!(follower.on_path_result(&found(2, vec![Vec3::ZERO, Vec3::X])));
        assert_eq!(follower.state(), FollowerState::Following);
        assert_eq!(follower.current_waypoint(), Some(Vec3::X));
    }

    #[test]
    fn test_unfollowable_result_goes_idle() {
        let mut follower = AgentFollower::default();
        follower.begin_request(RequestId(4), Vec3::new(5.0, 0.0, 5.0));
        assert!(follower.on_path_result(&PathResult::empty(RequestId(4), PathStatus::NotFound)));
        assert_eq!(follower.state(), FollowerState::Idle);
        assert!(follower.waypoints().is_empty());
    }

    #[test]
    fn test_stop_returns_pending_request_only() {
        let mut follower = AgentFollower::default();
        follower.begin_request(RequestId(3), Vec3::ONE);
        assert_eq!(follower.stop(), Some(RequestId(3)));
        assert_eq!(follower.state(), FollowerState::Idle);

        follower.begin_request(RequestId(5), Vec3::ONE);
        follower.on_path_result(&found(5, vec![Vec3::ZERO, Vec3::ONE]));
        assert_eq!(follower.stop(), None);
    }

    #[test]
    fn test_idle_update_writes_zero_velocity() {
        let fx = Fixture::new();
        let ctx = fx.ctx(&NoOccupancy, 0.1);
        let mut follower = AgentFollower::default();
        let mut velocity = AgentVelocity {
            desired: Vec3::X,
            adjusted: Vec3::X,
        };
        assert_eq!(follower.update(Vec3::ONE, &ctx, &mut velocity), FollowEvent::None);
        assert_eq!(velocity.desired, Vec3::ZERO);
    }

    #[test]
    fn test_follows_waypoints_to_arrival() {
        let fx = Fixture::new();
        let ctx = fx.ctx(&NoOccupancy, 0.05);
        let destination = Vec3::new(10.3, 0.0, 8.6);
        let mut follower = AgentFollower::default();
        follower.begin_request(RequestId(1), destination);
        follower.on_path_result(&found(
            1,
            vec![Vec3::new(1.5, 0.0, 1.5), Vec3::new(10.5, 0.0, 1.5), Vec3::new(10.5, 0.0, 8.5)],
        ));

        let mut position = Vec3::new(1.4, 0.0, 1.6);
        let mut velocity = AgentVelocity::default();
        let event = walk(&mut follower, &mut position, &ctx, &mut velocity, 1000);

        assert_eq!(event, FollowEvent::Arrived);
        assert_eq!(follower.state(), FollowerState::Idle);
        // Same cell as the last waypoint, so the exact destination is the target.
        assert!(planar(position).distance(planar(destination)) <= fx.config.arrival_threshold);
    }

    #[test]
    fn test_occupied_destination_is_relocated() {
        let fx = Fixture::new();
        let destination = Vec3::new(10.5, 0.0, 1.5);
        let other = move |c: Vec3, r: f32, exclude: Option<AgentId>| {
            exclude != Some(AgentId(2)) && c.distance(destination) < r + 0.5
        };
        let ctx = fx.ctx(&other, 0.05);

        let mut follower = AgentFollower::default();
        follower.begin_request(RequestId(1), destination);
        follower.on_path_result(&found(1, vec![Vec3::new(1.5, 0.0, 1.5), destination]));

        let mut position = Vec3::new(1.5, 0.0, 1.5);
        let mut velocity = AgentVelocity::default();
        let event = walk(&mut follower, &mut position, &ctx, &mut velocity, 1000);

        assert_eq!(event, FollowEvent::Arrived);
        let offset = planar(position).distance(planar(destination));
        assert!((offset - 1.25).abs() <= fx.config.arrival_threshold + 1e-3, "stopped {} away", offset);
    }

    #[test]
    fn test_stuck_agent_repaths_then_aborts() {
        let fx = Fixture::new();
        let ctx = fx.ctx(&NoOccupancy, 0.1);
        let destination = Vec3::new(20.5, 0.0, 20.5);
        let mut follower = AgentFollower::default();
        follower.begin_request(RequestId(1), destination);
        follower.on_path_result(&found(1, vec![Vec3::new(1.5, 0.0, 1.5), destination]));

        let blocked_at = Vec3::new(1.5, 0.0, 1.5);
        let mut velocity = AgentVelocity::default();
        let mut next_id = 2;
        for attempt in 1..=fx.config.max_repaths {
            let mut event = FollowEvent::None;
            for _ in 0..100 {
                event = follower.update(blocked_at, &ctx, &mut velocity);
                if event != FollowEvent::None {
                    break;
                }
            }
            assert_eq!(event, FollowEvent::NeedsRepath(destination), "attempt {}", attempt);
            assert_eq!(follower.repaths(), attempt);
            assert_eq!(follower.begin_repath(RequestId(next_id)), None);
            follower.on_path_result(&found(next_id, vec![blocked_at, destination]));
            next_id += 1;
        }

        let mut event = FollowEvent::None;
        for _ in 0..100 {
            event = follower.update(blocked_at, &ctx, &mut velocity);
            if event != FollowEvent::None {
                break;
            }
        }
        assert_eq!(event, FollowEvent::Aborted);
        assert_eq!(follower.state(), FollowerState::Idle);
        assert_eq!(velocity.desired, Vec3::ZERO);
    }

    #[test]
    fn test_end_of_partial_path_requests_continuation() {
        let fx = Fixture::new();
        let ctx = fx.ctx(&NoOccupancy, 0.05);
        let destination = Vec3::new(25.5, 0.0, 1.5);
        let mut follower = AgentFollower::default();
        follower.begin_request(RequestId(1), destination);
        follower.on_path_result(&PathResult {
            waypoints: vec![Vec3::new(1.5, 0.0, 1.5), Vec3::new(6.5, 0.0, 1.5)],
            ..PathResult::empty(RequestId(1), PathStatus::Partial)
        });

        let mut position = Vec3::new(1.5, 0.0, 1.5);
        let mut velocity = AgentVelocity::default();
        let event = walk(&mut follower, &mut position, &ctx, &mut velocity, 1000);
        assert_eq!(event, FollowEvent::NeedsRepath(destination));
        assert!(position.x > 6.0);
    }
}
