use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;

use kestrel_nav::nav::{
    load_nav_config, AgentFollower, AgentVelocity, FollowerState, FormationShape, GroupMoveCommand, NavAgent,
    NavEngine, NavPosition, NavSet, NavigationPlugin, Obstacle, ObstacleSet, SizeClass,
};

use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONFIG_PATH: &str = "assets/nav.ron";
const SQUAD_COUNT: usize = 4;
const SQUAD_SIZE: usize = 9;
const ORDER_INTERVAL_SECS: f32 = 6.0;
const RUN_SECS: f32 = 60.0;

fn setup_file_logging() -> Option<String> {
    let log_dir = PathBuf::from("logs");
    let file_logging = fs::create_dir_all(&log_dir).is_ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,kestrel_nav=info"));

    if !file_logging {
        // Minimal stdout layer
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stdout).with_target(false))
            .init();
        return None;
    }

    // Keep the last 25 runs
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("kestrel_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path = log_dir.join(&log_filename).to_string_lossy().to_string();

    // Single file per run
    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(fmt::layer().with_writer(std::io::stdout).with_target(false))
        .init();

    Some(log_path)
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|s| s.starts_with("kestrel") && s.ends_with(".log"))
        })
        .collect();

    // Oldest first
    log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

    if log_files.len() > keep_count {
        for file in log_files.iter().take(log_files.len() - keep_count) {
            let _ = fs::remove_file(file.path());
        }
    }
}

// ============================================================================
// Demo World
// ============================================================================

#[derive(Component)]
struct Squad(usize);

#[derive(Resource)]
struct Orders {
    timer: Timer,
    issued: u32,
}

#[derive(Resource)]
struct RunClock(Timer);

/// Scatter circular and box obstacles over the grid, leaving the spawn strip clear.
fn random_obstacles(extent: Vec2) -> ObstacleSet {
    let mut rng = rand::rng();
    let mut obstacles = ObstacleSet::new();
    for _ in 0..40 {
        let x = rng.random_range(0.0..extent.x);
        let z = rng.random_range(extent.y * 0.2..extent.y);
        if rng.random_bool(0.5) {
            let radius = rng.random_range(1.0..4.0);
            obstacles.insert(Obstacle::circle(Vec3::new(x, 0.0, z), radius));
        } else {
            let half = Vec3::new(rng.random_range(0.5..6.0), 0.0, rng.random_range(0.5..6.0));
            let center = Vec3::new(x, 0.0, z);
            obstacles.insert(Obstacle::rect(center - half, center + half));
        }
    }
    obstacles
}

fn spawn_squads(mut commands: Commands, engine: Res<NavEngine>) {
    let grid = engine.grid().config();
    let width = grid.width as f32 * grid.cell_size;
    let lane = width / SQUAD_COUNT as f32;

    for squad in 0..SQUAD_COUNT {
        let size_class = match squad % 3 {
            0 => SizeClass::Small,
            1 => SizeClass::Medium,
            _ => SizeClass::Large,
        };
        let radius = engine.config().grid.erosion_radius(size_class).max(0.4);
        let agent = NavAgent::new(size_class, radius, 5.0 - radius);
        let base = grid.origin + Vec3::new(lane * (squad as f32 + 0.5), 0.0, 4.0);

        for i in 0..SQUAD_SIZE {
            let offset = Vec3::new((i % 3) as f32 - 1.0, 0.0, (i / 3) as f32) * agent.formation_spacing;
            commands.spawn((
                Squad(squad),
                agent,
                NavPosition(base + offset),
                AgentVelocity::default(),
                AgentFollower::default(),
            ));
        }
    }
    info!("Spawned {} squads of {}", SQUAD_COUNT, SQUAD_SIZE);
}

fn pick_destination(engine: &NavEngine, class: SizeClass) -> Option<Vec3> {
    let grid = engine.grid().config();
    let extent = Vec2::new(grid.width as f32, grid.height as f32) * grid.cell_size;
    let mut rng = rand::rng();
    (0..32)
        .map(|_| grid.origin + Vec3::new(rng.random_range(0.0..extent.x), 0.0, rng.random_range(0.0..extent.y)))
        .find(|p| engine.is_position_navigable(*p, class))
}

fn issue_orders(
    time: Res<Time>,
    mut orders: ResMut<Orders>,
    engine: Res<NavEngine>,
    squads: Query<(Entity, &Squad, &NavAgent)>,
    mut moves: MessageWriter<GroupMoveCommand>,
) {
    if !orders.timer.tick(time.delta()).just_finished() && orders.issued > 0 {
        return;
    }
    orders.issued += 1;

    const SHAPES: [FormationShape; 4] = [
        FormationShape::Box,
        FormationShape::Line,
        FormationShape::Wedge,
        FormationShape::Column,
    ];

    for squad in 0..SQUAD_COUNT {
        let members: Vec<(Entity, SizeClass)> = squads
            .iter()
            .filter(|(_, s, _)| s.0 == squad)
            .map(|(e, _, a)| (e, a.size_class))
            .collect();
        let class = members.iter().map(|(_, c)| *c).max().unwrap_or_default();
        let Some(destination) = pick_destination(&engine, class) else {
            warn!("Squad {} found no navigable destination", squad);
            continue;
        };
        let shape = SHAPES[(squad + orders.issued as usize) % SHAPES.len()];
        moves.write(GroupMoveCommand {
            agents: members.into_iter().map(|(e, _)| e).collect(),
            destination,
            shape,
        });
    }
}

/// Stand-in for a movement integrator: apply whatever avoidance left us.
fn integrate_positions(fixed_time: Res<Time<Fixed>>, mut agents: Query<(&mut NavPosition, &AgentVelocity)>) {
    let dt = fixed_time.delta_secs();
    for (mut position, velocity) in agents.iter_mut() {
        position.0 += velocity.adjusted * dt;
    }
}

const REPORT_EVERY_TICKS: u64 = 100;

/// Update runs faster than the fixed tick, so each reporting tick is claimed once.
fn take_report_tick(tick: u64, last_reported: &mut u64) -> bool {
    if tick == 0 || tick % REPORT_EVERY_TICKS != 0 || tick <= *last_reported {
        return false;
    }
    *last_reported = tick;
    true
}

fn report(
    time: Res<Time>,
    mut clock: ResMut<RunClock>,
    engine: Res<NavEngine>,
    followers: Query<&AgentFollower>,
    mut exit: MessageWriter<AppExit>,
    mut last_reported: Local<u64>,
) {
    clock.0.tick(time.delta());
    let stats = engine.stats();
    if take_report_tick(engine.tick_count(), &mut last_reported) {
        let moving = followers.iter().filter(|f| f.state() != FollowerState::Idle).count();
        info!(
            "tick {}: {} moving, {} pending, {} served total, {:?} spent",
            engine.tick_count(),
            moving,
            engine.pending_requests(),
            stats.total_served,
            stats.total_time
        );
    }
    if clock.0.just_finished() {
        info!("Demo finished after {} ticks", engine.tick_count());
        exit.write(AppExit::Success);
    }
}

fn main() {
    let log_file = setup_file_logging();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  Kestrel Nav - headless demo                             ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    match &log_file {
        Some(path) => println!("║  Log file: {:<46}║", path),
        None => println!("║  Logging to stdout only                                  ║"),
    }
    println!("╚══════════════════════════════════════════════════════════╝");

    let config = load_nav_config(CONFIG_PATH);
    let extent = Vec2::new(config.grid.width as f32, config.grid.height as f32) * config.grid.cell_size;
    let engine = NavEngine::new(config, random_obstacles(extent));

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))))
        .add_plugins(NavigationPlugin::new())
        .insert_resource(Time::<Fixed>::from_hz(20.0))
        .insert_resource(engine)
        .insert_resource(Orders {
            timer: Timer::from_seconds(ORDER_INTERVAL_SECS, TimerMode::Repeating),
            issued: 0,
        })
        .insert_resource(RunClock(Timer::from_seconds(RUN_SECS, TimerMode::Once)))
        .add_systems(Startup, spawn_squads)
        .add_systems(Update, (issue_orders, report))
        .add_systems(FixedUpdate, integrate_positions.after(NavSet::Follow))
        .run();
}
