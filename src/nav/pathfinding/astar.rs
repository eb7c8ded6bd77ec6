use bevy::prelude::*;
use fixedbitset::FixedBitSet;

use crate::nav::grid::Cell;
use super::types::{PathResult, PathStatus, RequestId};

pub const STRAIGHT_COST: f32 = 1.0;
pub const DIAGONAL_COST: f32 = std::f32::consts::SQRT_2;

const NO_PARENT: u32 = u32::MAX;

/// 8-directional moves: (dx, dz, cost)
const DIRS: [(isize, isize, f32); 8] = [
    (1, 0, STRAIGHT_COST),
    (-1, 0, STRAIGHT_COST),
    (0, 1, STRAIGHT_COST),
    (0, -1, STRAIGHT_COST),
    (1, 1, DIAGONAL_COST),
    (-1, 1, DIAGONAL_COST),
    (1, -1, DIAGONAL_COST),
    (-1, -1, DIAGONAL_COST),
];

/// Octile distance: admissible heuristic for 8-directional grid movement.
#[inline]
pub fn octile_distance(a: Cell, b: Cell) -> f32 {
    let dx = a.x.abs_diff(b.x) as f32;
    let dz = a.z.abs_diff(b.z) as f32;
    STRAIGHT_COST * (dx + dz) + (DIAGONAL_COST - 2.0 * STRAIGHT_COST) * dx.min(dz)
}

/// Budget-capped A* over one walkability array.
///
/// Scratch arrays (g/f cost, parent, closed and open flags) are sized to the
/// grid once and reset lazily: only cells touched by the previous solve are
/// cleared. One solve at a time per instance.
///
/// The open set is a flat list scanned linearly for the lowest f cost. Ties
/// go to the earliest entry, so expansion order is a pure function of the
/// inputs.
#[derive(Debug, Clone)]
pub struct PathSolver {
    width: usize,
    height: usize,
    g_cost: Vec<f32>,
    f_cost: Vec<f32>,
    parent: Vec<u32>,
    closed: FixedBitSet,
    in_open: FixedBitSet,
    open: Vec<usize>,
    touched: Vec<usize>,
    nearest_walkable_radius: usize,
}

impl PathSolver {
    pub fn new(width: usize, height: usize, nearest_walkable_radius: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            g_cost: vec![f32::INFINITY; size],
            f_cost: vec![f32::INFINITY; size],
            parent: vec![NO_PARENT; size],
            closed: FixedBitSet::with_capacity(size),
            in_open: FixedBitSet::with_capacity(size),
            open: Vec::new(),
            touched: Vec::new(),
            nearest_walkable_radius,
        }
    }

    pub fn nearest_walkable_radius(&self) -> usize {
        self.nearest_walkable_radius
    }

    fn prepare(&mut self, width: usize, height: usize) {
        if width != self.width || height != self.height {
            *self = Self::new(width, height, self.nearest_walkable_radius);
            return;
        }
        for &idx in &self.touched {
            self.g_cost[idx] = f32::INFINITY;
            self.f_cost[idx] = f32::INFINITY;
            self.parent[idx] = NO_PARENT;
        }
        self.touched.clear();
        self.closed.clear();
        self.in_open.clear();
        self.open.clear();
    }

    #[inline]
    fn cell(&self, idx: usize) -> Cell {
        Cell::new(idx % self.width, idx / self.width)
    }

    /// Run A* from `start` to `end` over `nav` (row-major, `width` columns).
    ///
    /// Blocked endpoints are replaced by the nearest walkable cell within the
    /// configured ring radius. Exhausting `max_iterations` yields `Partial`
    /// toward the closed node with the smallest heuristic; an exhausted open
    /// set yields `Partial` if any node beat the start, `NotFound` otherwise.
    /// The returned result has cells but no waypoints; smoothing is separate.
    pub fn solve(&mut self, nav: &[bool], width: usize, start: Cell, end: Cell, max_iterations: usize) -> PathResult {
        if width == 0 || nav.is_empty() {
            return PathResult::invalid(RequestId::default());
        }
        let height = nav.len() / width;
        self.prepare(width, height);

        let walkable = |c: Cell| c.x < width && c.z < height && nav[c.z * width + c.x];
        if start.x >= width || start.z >= height || end.x >= width || end.z >= height {
            return PathResult::invalid(RequestId::default());
        }

        let start = if walkable(start) {
            start
        } else {
            match nearest_walkable(nav, width, height, start, self.nearest_walkable_radius) {
                Some(c) => c,
                None => return PathResult::empty(RequestId::default(), PathStatus::Invalid),
            }
        };
        let end = if walkable(end) {
            end
        } else {
            match nearest_walkable(nav, width, height, end, self.nearest_walkable_radius) {
                Some(c) => c,
                None => return PathResult::empty(RequestId::default(), PathStatus::NotFound),
            }
        };

        if start == end {
            return PathResult {
                cells: vec![start],
                ..PathResult::empty(RequestId::default(), PathStatus::Found)
            };
        }

        let start_idx = start.z * width + start.x;
        let goal_idx = end.z * width + end.x;

        self.g_cost[start_idx] = 0.0;
        self.f_cost[start_idx] = octile_distance(start, end);
        self.touched.push(start_idx);
        self.open.push(start_idx);
        self.in_open.insert(start_idx);

        let mut best = start_idx;
        let mut best_h = octile_distance(start, end);
        let mut iterations = 0usize;

        let (status, reached) = loop {
            if self.open.is_empty() {
                let status = if best != start_idx { PathStatus::Partial } else { PathStatus::NotFound };
                break (status, best);
            }
            if iterations >= max_iterations {
                break (PathStatus::Partial, best);
            }

            let mut min_pos = 0;
            for i in 1..self.open.len() {
                if self.f_cost[self.open[i]] < self.f_cost[self.open[min_pos]] {
                    min_pos = i;
                }
            }
            let current = self.open.remove(min_pos);
            self.in_open.set(current, false);
            self.closed.insert(current);
            iterations += 1;

            let current_cell = self.cell(current);
            let h = octile_distance(current_cell, end);
            if h < best_h {
                best = current;
                best_h = h;
            }
            if current == goal_idx {
                break (PathStatus::Found, current);
            }

            let (cx, cz) = (current_cell.x as isize, current_cell.z as isize);
            let current_g = self.g_cost[current];
            for &(dx, dz, cost) in &DIRS {
                let nx = cx + dx;
                let nz = cz + dz;
                if nx < 0 || nz < 0 || nx >= width as isize || nz >= height as isize {
                    continue;
                }
                let n_idx = nz as usize * width + nx as usize;
                if !nav[n_idx] || self.closed.contains(n_idx) {
                    continue;
                }
                // No corner cutting: both orthogonal neighbours must be open.
                if dx != 0 && dz != 0 {
                    let side_a = cz as usize * width + nx as usize;
                    let side_b = nz as usize * width + cx as usize;
                    if !nav[side_a] || !nav[side_b] {
                        continue;
                    }
                }

                let tentative_g = current_g + cost;
                if tentative_g < self.g_cost[n_idx] {
                    if self.g_cost[n_idx].is_infinite() {
                        self.touched.push(n_idx);
                    }
                    self.g_cost[n_idx] = tentative_g;
                    self.f_cost[n_idx] = tentative_g + octile_distance(Cell::new(nx as usize, nz as usize), end);
                    self.parent[n_idx] = current as u32;
                    if !self.in_open.contains(n_idx) {
                        self.in_open.insert(n_idx);
                        self.open.push(n_idx);
                    }
                }
            }
        };

        if iterations > 10_000 {
            warn!("[PATHFINDING] A* used {} iterations (high!) from {:?} to {:?}", iterations, start, end);
        }

        let cells = if status == PathStatus::NotFound {
            Vec::new()
        } else {
            self.reconstruct(reached)
        };

        PathResult {
            status,
            cells,
            iterations,
            ..PathResult::empty(RequestId::default(), status)
        }
    }

    fn reconstruct(&self, mut current: usize) -> Vec<Cell> {
        let mut path = vec![self.cell(current)];
        while self.parent[current] != NO_PARENT {
            current = self.parent[current] as usize;
            path.push(self.cell(current));
        }
        path.reverse();
        path
    }
}

/// Nearest walkable cell to `center`, scanning square rings outward up to `radius`.
///
/// Only each ring's perimeter is scanned. Within a ring the smallest Euclidean
/// distance wins, ties going to scan order.
pub fn nearest_walkable(nav: &[bool], width: usize, height: usize, center: Cell, radius: usize) -> Option<Cell> {
    let (cx, cz) = (center.x as isize, center.z as isize);
    for r in 1..=radius as isize {
        let mut best: Option<(isize, Cell)> = None;
        for dz in -r..=r {
            let on_edge_row = dz.abs() == r;
            let mut dx = -r;
            while dx <= r {
                let (x, z) = (cx + dx, cz + dz);
                if x >= 0 && z >= 0 && (x as usize) < width && (z as usize) < height {
                    let idx = z as usize * width + x as usize;
                    let d_sq = dx * dx + dz * dz;
                    if nav[idx] && best.is_none_or(|(b, _)| d_sq < b) {
                        best = Some((d_sq, Cell::new(x as usize, z as usize)));
                    }
                }
                // Interior rows only contribute their two end cells.
                dx += if on_edge_row { 1 } else { 2 * r };
            }
        }
        if let Some((_, cell)) = best {
            return Some(cell);
        }
    }
    None
}
