use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::nav::config::SizeClass;
use crate::nav::grid::Cell;

/// Opaque handle for a queued path request, used for cancellation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathStatus {
    /// The goal cell was reached.
    Found,
    /// Best-effort route toward the goal; the search budget ran out or the goal is unreachable.
    Partial,
    /// No route, or the goal was blocked with no walkable cell nearby.
    NotFound,
    /// An endpoint lies outside the grid, or the start was blocked with no walkable cell nearby.
    Invalid,
}

/// Outcome of one request. Produced once and handed to the request's callback.
#[derive(Clone, Debug, PartialEq)]
pub struct PathResult {
    pub request_id: RequestId,
    pub status: PathStatus,
    /// Raw A* cells from start to the reached cell. Empty if no search ran.
    pub cells: Vec<Cell>,
    /// Smoothed world-space polyline.
    pub waypoints: Vec<Vec3>,
    /// Sum of the distances between consecutive waypoints.
    pub length: f32,
    /// Nodes expanded by the search.
    pub iterations: usize,
}

impl PathResult {
    pub fn empty(request_id: RequestId, status: PathStatus) -> Self {
        Self {
            request_id,
            status,
            cells: Vec::new(),
            waypoints: Vec::new(),
            length: 0.0,
            iterations: 0,
        }
    }

    pub fn invalid(request_id: RequestId) -> Self {
        Self::empty(request_id, PathStatus::Invalid)
    }

    /// Found or Partial with something to follow.
    pub fn is_followable(&self) -> bool {
        matches!(self.status, PathStatus::Found | PathStatus::Partial) && !self.waypoints.is_empty()
    }
}

/// Completion callback. Runs exactly once, on the thread that ticks the scheduler.
pub type PathCallback = Box<dyn FnOnce(PathResult) + Send + Sync>;

/// A queued request. Never mutated after enqueue.
pub struct PathRequest {
    pub id: RequestId,
    pub start: Vec3,
    pub end: Vec3,
    /// Lower services first.
    pub priority: i32,
    pub size_class: SizeClass,
    pub(super) callback: PathCallback,
}

impl std::fmt::Debug for PathRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathRequest")
            .field("id", &self.id)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("priority", &self.priority)
            .field("size_class", &self.size_class)
            .finish_non_exhaustive()
    }
}
