use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::config::{GridConfig, SizeClass};
use super::math::WorldBounds;
use super::oracles::ObstructionOracle;
use super::profiling::profile;

mod erosion;

pub use erosion::disc_offsets;

/// One grid square, addressed by integer column `x` and row `z`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Cell {
    pub x: usize,
    pub z: usize,
}

impl Cell {
    pub const fn new(x: usize, z: usize) -> Self {
        Self { x, z }
    }
}

/// Inclusive rectangle of cells.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CellRect {
    pub min_x: usize,
    pub min_z: usize,
    pub max_x: usize,
    pub max_z: usize,
}

impl CellRect {
    pub fn full(width: usize, height: usize) -> Self {
        Self { min_x: 0, min_z: 0, max_x: width - 1, max_z: height - 1 }
    }

    /// Grow by `steps` on every side, clipped to the grid.
    pub fn grown(&self, steps: usize, width: usize, height: usize) -> Self {
        Self {
            min_x: self.min_x.saturating_sub(steps),
            min_z: self.min_z.saturating_sub(steps),
            max_x: (self.max_x + steps).min(width - 1),
            max_z: (self.max_z + steps).min(height - 1),
        }
    }

    pub fn cell_count(&self) -> usize {
        (self.max_x - self.min_x + 1) * (self.max_z - self.min_z + 1)
    }
}

/// Flat walkability arrays for one world: one raw grid from physical
/// occupancy, plus one eroded grid per [`SizeClass`].
///
/// Eroded grids are always derived from the raw grid, never from each other,
/// so erosion cannot compound across rebuilds.
///
/// # Mutation
///
/// - [`NavGrid::bake`] rescans every cell and rebuilds all grids.
/// - [`NavGrid::update_region`] rescans the neighbourhood of a change and
///   rebuilds only the affected sub-rectangles.
///
/// Neither may run while a solve is reading [`NavGrid::nav_array`]; the engine
/// serialises mutation before solving within a tick.
#[derive(Clone, Debug)]
pub struct NavGrid {
    config: GridConfig,
    raw: Vec<bool>,
    nav: [Vec<bool>; SizeClass::COUNT],
}

impl NavGrid {
    /// All-walkable grid. Call [`NavGrid::bake`] to pull in obstacles.
    pub fn new(config: GridConfig) -> Self {
        let size = config.cell_count();
        Self {
            config,
            raw: vec![true; size],
            nav: std::array::from_fn(|_| vec![true; size]),
        }
    }

    /// Grid from an explicit raw walkability array (row-major, `true` = walkable).
    ///
    /// A mismatched array length is treated as fully walkable.
    pub fn from_raw(config: GridConfig, raw: Vec<bool>) -> Self {
        let mut grid = Self::new(config);
        if raw.len() == grid.raw.len() {
            grid.raw = raw;
        } else {
            warn!(
                "[NAVGRID] Raw array length {} does not match {}x{} grid; using an open grid",
                raw.len(),
                grid.config.width,
                grid.config.height
            );
        }
        grid.rebuild_all_classes();
        grid
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.config.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.config.height
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.config.cell_size
    }

    #[inline]
    pub fn index(&self, cell: Cell) -> usize {
        cell.z * self.config.width + cell.x
    }

    #[inline]
    pub fn cell_at(&self, index: usize) -> Cell {
        Cell::new(index % self.config.width, index / self.config.width)
    }

    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        cell.x < self.config.width && cell.z < self.config.height
    }

    fn floor_coords(&self, pos: Vec3) -> (f32, f32) {
        let local = pos - self.config.origin;
        (
            (local.x / self.config.cell_size).floor(),
            (local.z / self.config.cell_size).floor(),
        )
    }

    /// Cell containing `pos`, clamped to the grid.
    pub fn world_to_cell(&self, pos: Vec3) -> Cell {
        let (fx, fz) = self.floor_coords(pos);
        // NaN casts to 0, so a non-finite position lands on the first cell.
        let x = (fx.max(0.0) as usize).min(self.config.width - 1);
        let z = (fz.max(0.0) as usize).min(self.config.height - 1);
        Cell::new(x, z)
    }

    /// Cell containing `pos`, or `None` outside the grid.
    pub fn world_to_cell_checked(&self, pos: Vec3) -> Option<Cell> {
        let (fx, fz) = self.floor_coords(pos);
        if !(fx >= 0.0 && fz >= 0.0) {
            return None;
        }
        let cell = Cell::new(fx as usize, fz as usize);
        self.contains(cell).then_some(cell)
    }

    /// World-space centre of `cell`, at the grid origin's height.
    pub fn cell_to_world(&self, cell: Cell) -> Vec3 {
        let half = self.config.cell_size * 0.5;
        self.config.origin
            + Vec3::new(
                cell.x as f32 * self.config.cell_size + half,
                0.0,
                cell.z as f32 * self.config.cell_size + half,
            )
    }

    pub fn is_raw_walkable(&self, cell: Cell) -> bool {
        self.contains(cell) && self.raw[self.index(cell)]
    }

    pub fn is_nav_walkable(&self, cell: Cell, class: SizeClass) -> bool {
        self.contains(cell) && self.nav[class.as_index()][self.index(cell)]
    }

    /// Nav walkability of the cell under a world position; outside the grid is never walkable.
    pub fn is_world_nav_walkable(&self, pos: Vec3, class: SizeClass) -> bool {
        self.world_to_cell_checked(pos)
            .is_some_and(|cell| self.is_nav_walkable(cell, class))
    }

    /// Read-only eroded array for the solver.
    pub fn nav_array(&self, class: SizeClass) -> &[bool] {
        &self.nav[class.as_index()]
    }

    pub fn raw_array(&self) -> &[bool] {
        &self.raw
    }

    pub fn walkable_count(&self, class: SizeClass) -> usize {
        self.nav[class.as_index()].iter().filter(|w| **w).count()
    }

    /// Full rebuild from the obstruction oracle.
    #[profile(50)]
    pub fn bake<O: ObstructionOracle + ?Sized>(&mut self, oracle: &O) {
        let start = Instant::now();
        let full = CellRect::full(self.width(), self.height());
        self.scan_raw(full, oracle);
        self.rebuild_all_classes();

        let elapsed = start.elapsed();
        let blocked = self.raw.iter().filter(|w| !**w).count();
        info!(
            "[NAVGRID] Baked {}x{} grid: {} blocked raw cells, walkable per class {:?} in {:?}",
            self.width(),
            self.height(),
            blocked,
            SizeClass::ALL.map(|c| self.walkable_count(c)),
            elapsed
        );
        if elapsed.as_millis() > 100 {
            warn!("[NAVGRID] Slow bake: {:?}", elapsed);
        }
    }

    /// Rescan the neighbourhood of `bounds` and re-derive erosion there.
    ///
    /// Raw cells are rescanned inside `bounds` grown by twice the largest
    /// erosion radius; each class then rebuilds that rectangle, reading blocked
    /// raw cells from a halo one erosion radius wider so obstacles just outside
    /// still erode into it. Invalid or fully off-grid bounds are a no-op.
    ///
    /// Returns whether anything was rebuilt.
    #[profile(5)]
    pub fn update_region<O: ObstructionOracle + ?Sized>(&mut self, bounds: WorldBounds, oracle: &O) -> bool {
        if !bounds.is_valid() {
            warn!("[NAVGRID] Ignoring region update with degenerate bounds {:?}", bounds);
            return false;
        }
        let expanded = bounds.expanded(self.config.max_erosion_radius() * 2.0);
        let Some(rect) = self.world_bounds_to_rect(&expanded) else {
            debug!("[NAVGRID] Region update {:?} does not touch the grid", bounds);
            return false;
        };

        self.scan_raw(rect, oracle);
        for class in SizeClass::ALL {
            let steps = self.config.erosion_steps(class);
            erosion::erode_rect(
                &self.raw,
                &mut self.nav[class.as_index()],
                self.config.width,
                self.config.height,
                steps,
                rect,
            );
        }
        trace!("[NAVGRID] Rebuilt region {:?} ({} cells)", rect, rect.cell_count());
        true
    }

    /// Clipped cell rectangle covering `bounds`, or `None` if it misses the grid.
    pub fn world_bounds_to_rect(&self, bounds: &WorldBounds) -> Option<CellRect> {
        let (min_x, min_z) = self.floor_coords(bounds.min);
        let (max_x, max_z) = self.floor_coords(bounds.max);
        let (w, h) = (self.width() as f32, self.height() as f32);
        if max_x < 0.0 || max_z < 0.0 || min_x >= w || min_z >= h {
            return None;
        }
        Some(CellRect {
            min_x: min_x.max(0.0) as usize,
            min_z: min_z.max(0.0) as usize,
            max_x: (max_x.min(w - 1.0)) as usize,
            max_z: (max_z.min(h - 1.0)) as usize,
        })
    }

    fn scan_raw<O: ObstructionOracle + ?Sized>(&mut self, rect: CellRect, oracle: &O) {
        let half = Vec2::splat(self.config.cell_size * 0.5 * self.config.probe_scale);
        let layers = self.config.obstacle_layers;
        for z in rect.min_z..=rect.max_z {
            for x in rect.min_x..=rect.max_x {
                let cell = Cell::new(x, z);
                let center = self.cell_to_world(cell);
                let idx = self.index(cell);
                self.raw[idx] = !oracle.is_box_obstructed(center, half, layers);
            }
        }
    }

    fn rebuild_all_classes(&mut self) {
        let full = CellRect::full(self.width(), self.height());
        for class in SizeClass::ALL {
            let steps = self.config.erosion_steps(class);
            erosion::erode_rect(
                &self.raw,
                &mut self.nav[class.as_index()],
                self.config.width,
                self.config.height,
                steps,
                full,
            );
        }
    }
}
