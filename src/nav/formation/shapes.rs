use bevy::prelude::*;

use super::FormationShape;

/// Local slot offsets for `count` agents, centred on the origin.
///
/// Slots are listed front row first. The bounding box of the result is
/// centred on zero on both axes.
pub fn get_offsets(count: usize, shape: FormationShape, spacing: f32) -> Vec<Vec2> {
    if count == 0 {
        return Vec::new();
    }
    let spacing = if spacing.is_finite() { spacing.max(0.0) } else { 0.0 };

    let raw = match shape {
        FormationShape::Box => {
            let cols = (count as f32).sqrt().ceil() as usize;
            grid_rows(count, cols, spacing)
        }
        FormationShape::Line => grid_rows(count, count, spacing),
        FormationShape::Column => grid_rows(count, 1, spacing),
        FormationShape::Wedge => (0..count)
            .map(|i| {
                // 0 is the tip; then left/right pairs, one rank further back each.
                let rank = (i + 1) / 2;
                let side = if i % 2 == 1 { -1.0 } else { 1.0 };
                let lateral = if rank == 0 { 0.0 } else { side * rank as f32 * spacing };
                Vec2::new(lateral, -(rank as f32) * spacing)
            })
            .collect(),
    };
    centre(raw)
}

/// Rows of `cols` slots running front to back. A short last row is centred.
fn grid_rows(count: usize, cols: usize, spacing: f32) -> Vec<Vec2> {
    let cols = cols.max(1);
    let mut out = Vec::with_capacity(count);
    let mut row = 0usize;
    while out.len() < count {
        let in_row = (count - out.len()).min(cols);
        let half = (in_row as f32 - 1.0) * 0.5;
        for i in 0..in_row {
            out.push(Vec2::new((i as f32 - half) * spacing, -(row as f32) * spacing));
        }
        row += 1;
    }
    out
}

fn centre(mut offsets: Vec<Vec2>) -> Vec<Vec2> {
    let (min, max) = offsets
        .iter()
        .fold((Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)), |(lo, hi), o| {
            (lo.min(*o), hi.max(*o))
        });
    let mid = (min + max) * 0.5;
    for o in &mut offsets {
        *o -= mid;
    }
    offsets
}

/// Shape for `count` agents squeezing through a passage `passage_width` wide.
///
/// Box when at least three columns fit and there are four or more agents,
/// otherwise single file.
pub fn auto_select(count: usize, spacing: f32, passage_width: f32) -> FormationShape {
    if spacing.is_nan() || spacing <= 0.0 || !passage_width.is_finite() {
        return FormationShape::Column;
    }
    let columns = (passage_width / spacing).floor();
    if columns >= 3.0 && count >= 4 {
        FormationShape::Box
    } else {
        FormationShape::Column
    }
}
