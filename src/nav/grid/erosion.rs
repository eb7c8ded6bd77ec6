use super::CellRect;

/// Offsets inside a Euclidean disc of radius `steps` cells (`dx² + dz² <= steps²`).
pub fn disc_offsets(steps: usize) -> Vec<(isize, isize)> {
    let r = steps as isize;
    let r_sq = r * r;
    let mut offsets = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    for dz in -r..=r {
        for dx in -r..=r {
            if dx * dx + dz * dz <= r_sq {
                offsets.push((dx, dz));
            }
        }
    }
    offsets
}

/// Re-derive `nav` inside `target` from `raw`.
///
/// Cells in `target` are reset to their raw value, then every raw-blocked cell
/// within `steps` of the target stamps its disc, clipped to `target`. Cells
/// outside `target` are left untouched.
pub(super) fn erode_rect(
    raw: &[bool],
    nav: &mut [bool],
    width: usize,
    height: usize,
    steps: usize,
    target: CellRect,
) {
    for z in target.min_z..=target.max_z {
        let row = z * width;
        nav[row + target.min_x..=row + target.max_x].copy_from_slice(&raw[row + target.min_x..=row + target.max_x]);
    }
    if steps == 0 {
        return;
    }

    let offsets = disc_offsets(steps);
    let halo = target.grown(steps, width, height);
    let (tx0, tz0) = (target.min_x as isize, target.min_z as isize);
    let (tx1, tz1) = (target.max_x as isize, target.max_z as isize);

    for z in halo.min_z..=halo.max_z {
        for x in halo.min_x..=halo.max_x {
            if raw[z * width + x] {
                continue;
            }
            for &(dx, dz) in &offsets {
                let nx = x as isize + dx;
                let nz = z as isize + dz;
                if nx < tx0 || nx > tx1 || nz < tz0 || nz > tz1 {
                    continue;
                }
                nav[nz as usize * width + nx as usize] = false;
            }
        }
    }
}
