use bevy::prelude::*;

use crate::nav::grid::{Cell, NavGrid};

/// Collapse a raw cell path to the cells where its direction must change.
///
/// From each anchor, jump to the farthest later cell with clear line of sight
/// on `nav`. The anchor index strictly increases, so the loop is bounded by
/// the path length. Paths of two cells or fewer come back unchanged.
pub fn smooth(cells: &[Cell], nav: &[bool], width: usize) -> Vec<Cell> {
    if cells.len() <= 2 {
        return cells.to_vec();
    }
    let last = cells.len() - 1;
    let mut out = vec![cells[0]];
    let mut anchor = 0usize;
    while anchor < last {
        let reach = (anchor + 2..=last)
            .rev()
            .find(|&j| has_line_of_sight(nav, width, cells[anchor], cells[j]))
            .unwrap_or(anchor + 1);
        out.push(cells[reach]);
        anchor = reach;
    }
    out
}

/// Smooth and convert to world-space cell centres.
pub fn smooth_to_world(cells: &[Cell], nav: &[bool], grid: &NavGrid) -> Vec<Vec3> {
    smooth(cells, nav, grid.width())
        .into_iter()
        .map(|c| grid.cell_to_world(c))
        .collect()
}

/// Total length of a polyline.
pub fn polyline_length(points: &[Vec3]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Bresenham line-of-sight: true if every cell from `a` to `b`, both included, is walkable.
pub fn has_line_of_sight(nav: &[bool], width: usize, a: Cell, b: Cell) -> bool {
    let walkable = |x: isize, z: isize| {
        x >= 0 && z >= 0 && (x as usize) < width && nav.get(z as usize * width + x as usize).copied().unwrap_or(false)
    };
    let (mut x0, mut z0) = (a.x as isize, a.z as isize);
    let (x1, z1) = (b.x as isize, b.z as isize);
    let dx = (x1 - x0).abs();
    let dz = -(z1 - z0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sz = if z0 < z1 { 1 } else { -1 };
    let mut err = dx + dz;
    loop {
        if !walkable(x0, z0) {
            return false;
        }
        if x0 == x1 && z0 == z1 {
            return true;
        }
        let e2 = 2 * err;
        if e2 >= dz {
            err += dz;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            z0 += sz;
        }
    }
}
