use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::arrival::ArrivalSearch;

/// Discrete agent-size bucket. Each class owns one eroded walkability grid.
///
/// The ordering is load-bearing: erosion radii must be non-decreasing with
/// the ordinal, so anything `Large` can walk `Small` can walk too.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SizeClass {
    #[default]
    Small = 0,
    Medium = 1,
    Large = 2,
}

impl SizeClass {
    pub const COUNT: usize = 3;

    pub const ALL: [SizeClass; Self::COUNT] = [SizeClass::Small, SizeClass::Medium, SizeClass::Large];

    #[inline]
    pub fn as_index(self) -> usize {
        self as usize
    }
}

/// Errors surfaced by the explicit configuration API.
///
/// Startup loading ([`load_nav_config`]) logs these and falls back to defaults.
#[derive(Debug, Error)]
pub enum NavConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Immutable grid layout, created once at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridConfig {
    /// World position of the grid's minimum corner. Y is carried into waypoints.
    pub origin: Vec3,
    pub width: usize,
    pub height: usize,
    pub cell_size: f32,
    /// Erosion radius in world units, indexed by [`SizeClass::as_index`].
    pub erosion_radii: [f32; SizeClass::COUNT],
    /// Collision layers that count as obstructions during bake.
    pub obstacle_layers: u32,
    /// Fraction of a cell's half-extent used for the obstruction probe.
    /// Slightly below 1.0 so an obstacle touching a cell edge does not block both neighbours.
    pub probe_scale: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            width: 128,
            height: 128,
            cell_size: 1.0,
            erosion_radii: [0.5, 1.0, 2.0],
            obstacle_layers: super::obstacles::layers::OBSTACLE | super::obstacles::layers::TERRAIN,
            probe_scale: 0.9,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), NavConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(NavConfigError::Invalid(format!(
                "grid dimensions must be non-zero (got {}x{})",
                self.width, self.height
            )));
        }
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(NavConfigError::Invalid(format!(
                "cell_size must be positive and finite (got {})",
                self.cell_size
            )));
        }
        if !self.origin.is_finite() {
            return Err(NavConfigError::Invalid("origin must be finite".into()));
        }
        for pair in self.erosion_radii.windows(2) {
            if pair[1] < pair[0] {
                return Err(NavConfigError::Invalid(format!(
                    "erosion radii must be non-decreasing with size class (got {:?})",
                    self.erosion_radii
                )));
            }
        }
        if self.erosion_radii.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(NavConfigError::Invalid(format!(
                "erosion radii must be finite and non-negative (got {:?})",
                self.erosion_radii
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn erosion_radius(&self, class: SizeClass) -> f32 {
        self.erosion_radii[class.as_index()]
    }

    /// Erosion expressed in whole cells: `ceil(radius / cell_size)`.
    #[inline]
    pub fn erosion_steps(&self, class: SizeClass) -> usize {
        (self.erosion_radius(class) / self.cell_size).ceil().max(0.0) as usize
    }

    pub fn max_erosion_radius(&self) -> f32 {
        self.erosion_radii.iter().copied().fold(0.0, f32::max)
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }
}

/// A* tuning that is independent of the scheduler budget.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Ring radius (cells) searched for a walkable substitute when an endpoint is blocked.
    pub nearest_walkable_radius: usize,
    /// Cap used by `request_path_immediate`, which bypasses the tick budget.
    pub immediate_max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            nearest_walkable_radius: 15,
            immediate_max_iterations: 100_000,
        }
    }
}

/// Per-tick admission budget.
///
/// `iters_per_ms` is an empirical throughput estimate used only to size the
/// adaptive iteration cap; tune it for latency, not correctness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub budget_ms: f32,
    pub iters_per_ms: f32,
    pub min_iterations: usize,
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), NavConfigError> {
        if !self.budget_ms.is_finite() || self.budget_ms < 0.0 {
            return Err(NavConfigError::Invalid(format!(
                "budget_ms must be finite and non-negative (got {})",
                self.budget_ms
            )));
        }
        if !self.iters_per_ms.is_finite() || self.iters_per_ms < 0.0 {
            return Err(NavConfigError::Invalid(format!(
                "iters_per_ms must be finite and non-negative (got {})",
                self.iters_per_ms
            )));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            budget_ms: 2.0,
            iters_per_ms: 2_000.0,
            min_iterations: 256,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormationConfig {
    /// Below this share of walkable slots the orchestrator retries as a column.
    pub min_walkable_ratio: f32,
    /// Scheduler priority for per-agent requests issued by a group move.
    pub request_priority: i32,
    /// Forward-axis gap that separates two formation rows.
    pub row_epsilon: f32,
    /// Below this distance the group is considered already at the destination.
    pub facing_epsilon: f32,
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            min_walkable_ratio: 0.6,
            request_priority: 10,
            row_epsilon: 0.01,
            facing_epsilon: 0.001,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FollowerConfig {
    pub waypoint_radius: f32,
    pub arrival_threshold: f32,
    /// Distance from the final point at which arrival contention is checked.
    pub arrival_check_distance: f32,
    pub stuck_time: f32,
    pub stuck_distance: f32,
    pub max_repaths: u32,
    pub repath_priority: i32,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            waypoint_radius: 0.5,
            arrival_threshold: 0.15,
            arrival_check_distance: 3.0,
            stuck_time: 1.5,
            stuck_distance: 0.25,
            max_repaths: 3,
            repath_priority: 5,
        }
    }
}

/// Top-level navigation configuration, loaded once at startup.
#[derive(Resource, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub grid: GridConfig,
    pub solver: SolverConfig,
    pub scheduler: SchedulerConfig,
    pub formation: FormationConfig,
    pub arrival: ArrivalSearch,
    pub follower: FollowerConfig,
}

impl NavConfig {
    pub fn from_ron_str(contents: &str) -> Result<Self, NavConfigError> {
        let config: NavConfig = ron::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section a bad value could make fatal.
    pub fn validate(&self) -> Result<(), NavConfigError> {
        self.grid.validate()?;
        self.scheduler.validate()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NavConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }
}

/// Load the navigation config from a RON file, falling back to defaults on any failure.
pub fn load_nav_config(path: impl AsRef<Path>) -> NavConfig {
    let path = path.as_ref();
    match NavConfig::from_file(path) {
        Ok(config) => {
            info!("Loaded navigation config from {}", path.display());
            config
        }
        Err(e) => {
            error!("Failed to load navigation config {}: {}", path.display(), e);
            error!("Using default NavConfig");
            NavConfig::default()
        }
    }
}
