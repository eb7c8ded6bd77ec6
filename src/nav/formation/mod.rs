/// Formation planning for group moves.
///
/// - **shapes**: slot offsets per shape, plus the narrow-passage shape heuristic
/// - **assignment**: non-crossing agent-to-slot assignment and slot validation
///
/// Offsets are local `Vec2`s: `x` points right of the facing direction, `y`
/// points forward. [`crate::nav::math::rotate_local`] maps them to world space.

use serde::{Deserialize, Serialize};

mod shapes;
mod assignment;


pub use shapes::{get_offsets, auto_select};
pub use assignment::{assign_slots, assign_slots_with_epsilon, count_walkable_positions, ROW_EPSILON};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormationShape {
    /// Rows of ⌈√n⌉ columns.
    #[default]
    Box,
    /// One row abreast.
    Line,
    /// Chevron, point first.
    Wedge,
    /// Single file.
    Column,
}
