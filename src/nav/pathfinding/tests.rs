/// Tests for A*, smoothing and the request scheduler.
///
/// Maps are written as ASCII rows: `.` walkable, `#` blocked. Row 0 is z = 0.
use super::*;
use crate::nav::config::{GridConfig, SchedulerConfig};
use crate::nav::grid::Cell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn grid_config(width: usize, height: usize) -> GridConfig {
    GridConfig {
        width,
        height,
        cell_size: 1.0,
        erosion_radii: [0.0, 0.0, 0.0],
        ..Default::default()
    }
}

fn grid_from_ascii(rows: &[&str]) -> NavGrid {
    let width = rows[0].len();
    let raw: Vec<bool> = rows.iter().flat_map(|r| r.chars().map(|c| c != '#')).collect();
    NavGrid::from_raw(grid_config(width, rows.len()), raw)
}

fn open_grid(width: usize, height: usize) -> NavGrid {
    NavGrid::from_raw(grid_config(width, height), vec![true; width * height])
}

fn solve(grid: &NavGrid, start: Cell, end: Cell, max_iterations: usize) -> PathResult {
    let mut solver = PathSolver::new(grid.width(), grid.height(), 15);
    solver.solve(grid.nav_array(SizeClass::Small), grid.width(), start, end, max_iterations)
}

fn assert_valid_steps(grid: &NavGrid, cells: &[Cell]) {
    for pair in cells.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        assert!(a.x.abs_diff(b.x) <= 1 && a.z.abs_diff(b.z) <= 1 && a != b, "non-adjacent step {:?} -> {:?}", a, b);
        assert!(grid.is_nav_walkable(b, SizeClass::Small), "stepped onto blocked {:?}", b);
        if a.x != b.x && a.z != b.z {
            assert!(grid.is_nav_walkable(Cell::new(b.x, a.z), SizeClass::Small), "corner cut at {:?} -> {:?}", a, b);
            assert!(grid.is_nav_walkable(Cell::new(a.x, b.z), SizeClass::Small), "corner cut at {:?} -> {:?}", a, b);
        }
    }
}

// ============================================================================
// A*
// ============================================================================

#[test]
fn test_open_grid_path_matches_octile_distance() {
    let grid = open_grid(32, 32);
    let pairs = [
        (Cell::new(0, 0), Cell::new(31, 31)),
        (Cell::new(3, 20), Cell::new(25, 4)),
        (Cell::new(10, 10), Cell::new(10, 30)),
        (Cell::new(30, 2), Cell::new(1, 9)),
    ];
    for (start, end) in pairs {
        let result = solve(&grid, start, end, usize::MAX);
        assert_eq!(result.status, PathStatus::Found);
        let steps = start.x.abs_diff(end.x).max(start.z.abs_diff(end.z));
        assert_eq!(result.cells.len(), steps + 1, "{:?} -> {:?}", start, end);
        assert_eq!(result.cells.first(), Some(&start));
        assert_eq!(result.cells.last(), Some(&end));

        let cost: f32 = result
            .cells
            .windows(2)
            .map(|w| if w[0].x != w[1].x && w[0].z != w[1].z { DIAGONAL_COST } else { STRAIGHT_COST })
            .sum();
        assert!((cost - octile_distance(start, end)).abs() < 1e-3);
    }
}

#[test]
fn test_no_corner_cutting_through_diagonal_gap() {
    let grid = grid_from_ascii(&[
        ".....",
        ".#...",
        "..#..",
        ".....",
    ]);
    let result = solve(&grid, Cell::new(0, 0), Cell::new(3, 3), usize::MAX);
    assert_eq!(result.status, PathStatus::Found);
    assert_valid_steps(&grid, &result.cells);
    // The diagonal (1,2)->(2,1) squeeze is forbidden.
    let squeezed = result.cells.windows(2).any(|w| {
        (w[0] == Cell::new(1, 2) && w[1] == Cell::new(2, 1)) || (w[0] == Cell::new(2, 1) && w[1] == Cell::new(1, 2))
    });
    assert!(!squeezed);
}

#[test]
fn test_random_grids_produce_valid_steps() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..20 {
        let (w, h) = (24, 24);
        let raw: Vec<bool> = (0..w * h).map(|_| rng.f32() > 0.25).collect();
        let grid = NavGrid::from_raw(grid_config(w, h), raw);
        let start = Cell::new(rng.usize(0..w), rng.usize(0..h));
        let end = Cell::new(rng.usize(0..w), rng.usize(0..h));
        let result = solve(&grid, start, end, usize::MAX);
        if result.status == PathStatus::Found {
            assert_valid_steps(&grid, &result.cells);
        }
        if matches!(result.status, PathStatus::NotFound | PathStatus::Invalid) {
            assert!(result.cells.is_empty());
        }
    }
}

#[test]
fn test_iteration_budget_returns_partial_toward_goal() {
    let grid = grid_from_ascii(&[
        "..........",
        "..........",
        "......#...",
        "......#...",
        "......#...",
        "......#...",
        "..........",
        "..........",
    ]);
    let start = Cell::new(0, 4);
    let end = Cell::new(9, 4);
    let result = solve(&grid, start, end, 12);

    assert_eq!(result.status, PathStatus::Partial);
    assert_eq!(result.iterations, 12);
    assert_eq!(result.cells.first(), Some(&start));
    let reached = *result.cells.last().expect("partial path has cells");
    // Best node by heuristic, strictly closer than the start.
    assert!(octile_distance(reached, end) < octile_distance(start, end));
    assert_valid_steps(&grid, &result.cells);
}

#[test]
fn test_partial_only_when_budget_hit_for_reachable_goal() {
    let grid = open_grid(20, 20);
    let full = solve(&grid, Cell::new(0, 0), Cell::new(19, 7), usize::MAX);
    assert_eq!(full.status, PathStatus::Found);
    let exact = solve(&grid, Cell::new(0, 0), Cell::new(19, 7), full.iterations);
    assert_eq!(exact.status, PathStatus::Found);
    let short = solve(&grid, Cell::new(0, 0), Cell::new(19, 7), full.iterations - 1);
    assert_eq!(short.status, PathStatus::Partial);
    assert_eq!(short.iterations, full.iterations - 1);
}

#[test]
fn test_blocked_start_uses_nearest_walkable() {
    let grid = grid_from_ascii(&[
        "......",
        ".###..",
        ".###..",
        ".###..",
        "......",
    ]);
    let result = solve(&grid, Cell::new(2, 2), Cell::new(5, 4), usize::MAX);
    assert_eq!(result.status, PathStatus::Found);
    let first = result.cells[0];
    assert!(grid.is_nav_walkable(first, SizeClass::Small));
    assert_eq!(first.x.abs_diff(2).max(first.z.abs_diff(2)), 2);
}

#[test]
fn test_unresolvable_start_is_invalid_and_end_is_not_found() {
    let mut rows = vec!["#".repeat(40); 40];
    rows[0] = format!("..{}", "#".repeat(38));
    let rows: Vec<&str> = rows.iter().map(|s| s.as_str()).collect();
    let grid = grid_from_ascii(&rows);

    let from_blocked = solve(&grid, Cell::new(39, 39), Cell::new(0, 0), usize::MAX);
    assert_eq!(from_blocked.status, PathStatus::Invalid);
    assert!(from_blocked.cells.is_empty());

    let to_blocked = solve(&grid, Cell::new(0, 0), Cell::new(39, 39), usize::MAX);
    assert_eq!(to_blocked.status, PathStatus::NotFound);
    assert!(to_blocked.cells.is_empty());
}

#[test]
fn test_enclosed_start_is_not_found() {
    let grid = grid_from_ascii(&[
        "###....",
        "#.#....",
        "###....",
    ]);
    let result = solve(&grid, Cell::new(1, 1), Cell::new(6, 2), usize::MAX);
    assert_eq!(result.status, PathStatus::NotFound);
    assert!(result.cells.is_empty());
}

#[test]
fn test_unreachable_goal_with_progress_is_partial() {
    let grid = grid_from_ascii(&[
        "....#...",
        "....#...",
        "....#...",
        "....#...",
    ]);
    let result = solve(&grid, Cell::new(0, 1), Cell::new(7, 1), usize::MAX);
    assert_eq!(result.status, PathStatus::Partial);
    assert_eq!(result.cells.last().map(|c| c.x), Some(3));
}

#[test]
fn test_solver_reuse_is_deterministic() {
    let grid = grid_from_ascii(&[
        "..........",
        "..####....",
        ".....#....",
        ".....#....",
        "..........",
    ]);
    let mut solver = PathSolver::new(grid.width(), grid.height(), 15);
    let nav = grid.nav_array(SizeClass::Small);
    let first = solver.solve(nav, grid.width(), Cell::new(0, 2), Cell::new(9, 2), usize::MAX);
    let _other = solver.solve(nav, grid.width(), Cell::new(9, 0), Cell::new(0, 4), usize::MAX);
    let again = solver.solve(nav, grid.width(), Cell::new(0, 2), Cell::new(9, 2), usize::MAX);
    assert_eq!(first, again);
}

#[test]
fn test_equal_f_cost_expands_earliest_open_entry() {
    // From (0,0), (1,0) and (1,1) both reach f = 1 + sqrt(2). (1,0) entered the
    // open list first, so it is expanded first and becomes the goal's parent.
    let grid = open_grid(3, 2);
    let result = solve(&grid, Cell::new(0, 0), Cell::new(2, 1), usize::MAX);
    assert_eq!(result.status, PathStatus::Found);
    assert_eq!(result.cells, vec![Cell::new(0, 0), Cell::new(1, 0), Cell::new(2, 1)]);
    // start, (1,0), (1,1) on the tie, then the goal
    assert_eq!(result.iterations, 4);
}

#[test]
fn test_start_equals_end_is_trivially_found() {
    let grid = open_grid(4, 4);
    let result = solve(&grid, Cell::new(2, 2), Cell::new(2, 2), 0);
    assert_eq!(result.status, PathStatus::Found);
    assert_eq!(result.cells, vec![Cell::new(2, 2)]);
}

#[test]
fn test_nearest_walkable_prefers_euclidean_within_ring() {
    let grid = grid_from_ascii(&[
        ".....",
        "#####",
        "#####",
        "#####",
        "....#",
    ]);
    let nav = grid.nav_array(SizeClass::Small);
    // Ring 2 around (2,2) holds row 0 and row 4; straight down/up beats the corners.
    let found = nearest_walkable(nav, 5, 5, Cell::new(2, 2), 3).expect("walkable within radius");
    assert_eq!(found.x, 2);
    assert!(nearest_walkable(nav, 5, 5, Cell::new(2, 2), 1).is_none());
}

// ============================================================================
// compute_path + smoothing
// ============================================================================

#[test]
fn test_start_outside_grid_is_invalid_with_empty_waypoints() {
    let grid = open_grid(16, 16);
    let mut solver = PathSolver::new(16, 16, 15);
    let result = compute_path(
        &grid,
        &mut solver,
        Vec3::new(-5.0, 0.0, 3.0),
        Vec3::new(8.0, 0.0, 8.0),
        SizeClass::Small,
        1000,
        RequestId(9),
    );
    assert_eq!(result.status, PathStatus::Invalid);
    assert_eq!(result.request_id, RequestId(9));
    assert!(result.waypoints.is_empty());
    assert!(result.cells.is_empty());
}

#[test]
fn test_open_grid_smooths_to_straight_line() {
    let grid = open_grid(32, 32);
    let mut solver = PathSolver::new(32, 32, 15);
    let result = compute_path(
        &grid,
        &mut solver,
        Vec3::new(1.5, 0.0, 1.5),
        Vec3::new(20.5, 0.0, 9.5),
        SizeClass::Small,
        usize::MAX,
        RequestId(1),
    );
    assert_eq!(result.status, PathStatus::Found);
    assert_eq!(result.waypoints.len(), 2);
    assert_eq!(result.waypoints[0], Vec3::new(1.5, 0.0, 1.5));
    assert_eq!(result.waypoints[1], Vec3::new(20.5, 0.0, 9.5));
    assert!((result.length - polyline_length(&result.waypoints)).abs() < 1e-5);
}

#[test]
fn test_smoothed_waypoints_keep_line_of_sight_and_are_idempotent() {
    let mut rng = fastrand::Rng::with_seed(1234);
    for _ in 0..25 {
        let (w, h) = (30, 30);
        let raw: Vec<bool> = (0..w * h).map(|_| rng.f32() > 0.2).collect();
        let grid = NavGrid::from_raw(grid_config(w, h), raw);
        let nav = grid.nav_array(SizeClass::Small);
        let start = Cell::new(rng.usize(0..w), rng.usize(0..h));
        let end = Cell::new(rng.usize(0..w), rng.usize(0..h));
        let result = solve(&grid, start, end, usize::MAX);
        if result.status != PathStatus::Found {
            continue;
        }

        let smoothed = smooth(&result.cells, nav, w);
        assert_eq!(smoothed.first(), result.cells.first());
        assert_eq!(smoothed.last(), result.cells.last());
        for pair in smoothed.windows(2) {
            assert!(has_line_of_sight(nav, w, pair[0], pair[1]), "blocked segment {:?}", pair);
        }
        assert_eq!(smooth(&smoothed, nav, w), smoothed);
    }
}

#[test]
fn test_smoothing_keeps_corner_around_wall() {
    let grid = grid_from_ascii(&[
        "........",
        "........",
        "#######.",
        "........",
    ]);
    let nav = grid.nav_array(SizeClass::Small);
    let result = solve(&grid, Cell::new(0, 3), Cell::new(0, 0), usize::MAX);
    assert_eq!(result.status, PathStatus::Found);
    let smoothed = smooth(&result.cells, nav, 8);
    assert!(smoothed.len() >= 3);
    assert!(smoothed.iter().any(|c| c.x == 7));
}

#[test]
fn test_line_of_sight_includes_endpoints() {
    let grid = grid_from_ascii(&["...#"]);
    let nav = grid.nav_array(SizeClass::Small);
    assert!(has_line_of_sight(nav, 4, Cell::new(0, 0), Cell::new(2, 0)));
    assert!(!has_line_of_sight(nav, 4, Cell::new(0, 0), Cell::new(3, 0)));
}

// ============================================================================
// Scheduler
// ============================================================================

type Log = Arc<Mutex<Vec<(RequestId, PathStatus)>>>;

fn recorder(log: &Log) -> impl FnOnce(PathResult) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |result: PathResult| {
        if let Ok(mut entries) = log.lock() {
            entries.push((result.request_id, result.status));
        }
    }
}

fn scheduler(budget_ms: f32) -> RequestScheduler {
    RequestScheduler::new(SchedulerConfig {
        budget_ms,
        iters_per_ms: 1000.0,
        min_iterations: 64,
    })
}

#[test]
fn test_tick_services_by_priority_then_enqueue_order() {
    let grid = open_grid(16, 16);
    let mut solver = PathSolver::new(16, 16, 15);
    let mut sched = scheduler(1000.0);
    let log: Log = Arc::default();

    let p = |x: f32| Vec3::new(x, 0.0, 1.0);
    let a = sched.enqueue(p(1.0), p(5.0), recorder(&log), 5, SizeClass::Small);
    let b = sched.enqueue(p(1.0), p(6.0), recorder(&log), 1, SizeClass::Small);
    let c = sched.enqueue(p(1.0), p(7.0), recorder(&log), 5, SizeClass::Small);
    let d = sched.enqueue(p(1.0), p(8.0), recorder(&log), 1, SizeClass::Small);

    let stats = sched.tick(&grid, &mut solver);
    assert_eq!(stats.served, 4);
    assert_eq!(stats.remaining, 0);
    let order: Vec<RequestId> = log.lock().map(|l| l.iter().map(|(id, _)| *id).collect()).unwrap_or_default();
    assert_eq!(order, vec![b, d, a, c]);
}

#[test]
fn test_cancel_removes_pending_and_is_noop_afterwards() {
    let grid = open_grid(16, 16);
    let mut solver = PathSolver::new(16, 16, 15);
    let mut sched = scheduler(1000.0);
    let log: Log = Arc::default();

    let p = Vec3::new(1.0, 0.0, 1.0);
    let a = sched.enqueue(p, p + Vec3::X, recorder(&log), 0, SizeClass::Small);
    let b = sched.enqueue(p, p + Vec3::Z, recorder(&log), 0, SizeClass::Small);
    let c = sched.enqueue(p, p + Vec3::X * 2.0, recorder(&log), 0, SizeClass::Small);

    assert!(sched.cancel(a));
    assert!(!sched.cancel(a));
    assert!(!sched.cancel(RequestId(999)));
    sched.tick(&grid, &mut solver);
    assert!(!sched.cancel(b), "serviced ids cannot be cancelled");

    let order: Vec<RequestId> = log.lock().map(|l| l.iter().map(|(id, _)| *id).collect()).unwrap_or_default();
    assert_eq!(order, vec![b, c]);
    assert_eq!(sched.stats().total_cancelled, 1);
}

#[test]
fn test_budget_leaves_remainder_queued_with_fake_clock() {
    let grid = open_grid(16, 16);
    let mut solver = PathSolver::new(16, 16, 15);
    let mut sched = scheduler(2.0);
    let log: Log = Arc::default();
    for i in 0..500 {
        let x = (i % 10) as f32 + 0.5;
        sched.enqueue(Vec3::new(x, 0.0, 0.5), Vec3::new(x, 0.0, 1.5), recorder(&log), 0, SizeClass::Small);
    }

    // Each clock read advances 0.25 ms: 8 starts fit in 2 ms.
    let mut t = Duration::ZERO;
    let stats = sched.tick_with_clock(&grid, &mut solver, || {
        let now = t;
        t += Duration::from_micros(250);
        now
    });
    assert_eq!(stats.served, 8);
    assert_eq!(stats.remaining, 492);
    assert_eq!(sched.pending_len(), 492);

    // The remainder keeps enqueue order for the next tick.
    let first_ids: Vec<u64> = log.lock().map(|l| l.iter().map(|(id, _)| id.0).collect()).unwrap_or_default();
    assert_eq!(first_ids, (1..=8).collect::<Vec<u64>>());
}

#[test]
fn test_iteration_cap_shrinks_but_respects_minimum() {
    let sched = scheduler(2.0);
    assert_eq!(sched.iteration_cap(2.0), 2000);
    assert_eq!(sched.iteration_cap(0.5), 500);
    assert_eq!(sched.iteration_cap(0.01), 64);
    assert_eq!(sched.iteration_cap(-1.0), 64);
}

#[test]
fn test_zero_budget_services_nothing() {
    let grid = open_grid(8, 8);
    let mut solver = PathSolver::new(8, 8, 15);
    let mut sched = scheduler(0.0);
    let log: Log = Arc::default();
    sched.enqueue(Vec3::ONE, Vec3::splat(3.0), recorder(&log), 0, SizeClass::Small);
    let stats = sched.tick(&grid, &mut solver);
    assert_eq!(stats.served, 0);
    assert_eq!(sched.pending_len(), 1);
}

#[test]
fn test_unrepresentable_budget_serves_everything() {
    let grid = open_grid(8, 8);
    let mut solver = PathSolver::new(8, 8, 15);
    let log: Log = Arc::default();
    for budget_ms in [1e30, f32::INFINITY] {
        let mut sched = scheduler(budget_ms);
        for i in 0..5 {
            let x = i as f32 + 0.5;
            sched.enqueue(Vec3::new(x, 0.0, 0.5), Vec3::new(x, 0.0, 6.5), recorder(&log), 0, SizeClass::Small);
        }
        let stats = sched.tick(&grid, &mut solver);
        assert_eq!(stats.served, 5, "budget {}", budget_ms);
        assert_eq!(stats.remaining, 0);
    }
    assert!(log.lock().map(|l| l.iter().all(|(_, s)| *s == PathStatus::Found)).unwrap_or(false));
}
