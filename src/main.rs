//! insitu-steer - Demo driver
//!
//! Runs a synthetic simulation on four ranks (one thread each) against the
//! loopback viewer. The viewer changes the render interval and pauses and
//! resumes the run once, exercising the steering path end to end.
//!
//! Usage: `insitu-steer [config.toml]`

use anyhow::Context;
use insitu_steer::{
    config::VisConfig,
    host::{HostSimulation, StaticDecomposition},
    pipeline::{LoopbackPipeline, LoopbackViewer, ViewerEvent},
    session::{SessionContext, StepOutcome, VisSession},
    source::{DerivedFieldSource, DerivedQuantity, FieldSource, ParticleSource, SourceRegistry},
    telemetry::{Collective, LocalCollective},
    VisError,
};
use serde_json::json;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PROC_GRID: [u32; 3] = [2, 2, 1];
const LOCAL_SIZE: [u32; 3] = [16, 16, 8];
const GUARD: [u32; 3] = [1, 1, 1];
const BUCKET_SIZE: [u32; 3] = [4, 4, 4];
const STEPS: u32 = 40;
const SLIDE_EVERY: u32 = 2;
const LOG_FILE_NAME: &str = "insitu-steer.log";

/// Frames of rank 0 after which the viewer script acts
const SET_INTERVAL_AFTER: u32 = 3;
const PAUSE_AFTER: u32 = 6;
/// Pause toggle as the viewer sends it on the wire
const PAUSE_TOGGLE: &str = r#"{"pause": true}"#;

fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,insitu_steer=debug")),
        )
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn build_sources() -> insitu_steer::Result<SourceRegistry> {
    SourceRegistry::new()
        .with(FieldSource::vector("E", true))?
        .with(FieldSource::vector_field("B", true))?
        .with(FieldSource::vector("J", false))?
        .with(DerivedFieldSource::new(DerivedQuantity::new("e", "all", "Density")))?
        .with(DerivedFieldSource::new(DerivedQuantity::new("e", "all", "Energy")))?
        .with(ParticleSource::new("e"))
}

/// Publish this step's synthetic fields
fn advance(sim: &mut HostSimulation, step: u32) {
    let phase = step as f32 * 0.1;
    sim.insert_vector_field("E", |[x, y, _]| {
        [(x as f32 * 0.2 + phase).sin(), (y as f32 * 0.2 + phase).cos(), 0.0]
    });
    sim.insert_vector_field("B", |[_, _, z]| [0.0, 0.0, (z as f32 * 0.3 - phase).sin()]);
    sim.insert_vector_field("J", |_| [phase.cos(), 0.0, 0.0]);
    sim.enqueue_work();
}

/// What one rank did during the run
#[derive(Debug, Default)]
struct RankReport {
    rank: u32,
    rendered_steps: u32,
    cycles: u32,
}

fn run_rank(
    config: VisConfig,
    collective: LocalCollective,
    pipeline: LoopbackPipeline,
) -> insitu_steer::Result<RankReport> {
    let rank = collective.rank();
    let grid = StaticDecomposition::for_rank(PROC_GRID, LOCAL_SIZE, rank)
        .with_moving_window(true)
        .with_slide_every(SLIDE_EVERY);

    let mut sim = HostSimulation::new(LOCAL_SIZE, GUARD, BUCKET_SIZE);
    sim.insert_uniform_species("e", 2, [0.1 * rank as f32, 0.2, 0.0]);

    let mut session = VisSession::new(
        config,
        SessionContext::new(Box::new(collective)),
        pipeline,
        build_sources()?,
    );
    session.start(&grid)?;

    let mut report = RankReport {
        rank,
        ..Default::default()
    };
    for step in 0..STEPS {
        grid.set_step(step);
        advance(&mut sim, step);
        match session.on_step(step, &mut sim, &grid) {
            Ok(StepOutcome::Rendered { cycles }) => {
                report.rendered_steps += 1;
                report.cycles += cycles;
            }
            Ok(StepOutcome::Inactive) => break,
            Ok(_) => {}
            Err(e) => {
                session.shutdown();
                return Err(e);
            }
        }
    }
    session.shutdown();
    Ok(report)
}

type RankHandle = thread::JoinHandle<insitu_steer::Result<RankReport>>;

fn send_toggle(viewer: &LoopbackViewer) {
    if let Err(e) = viewer.send_text(PAUSE_TOGGLE) {
        tracing::warn!("Viewer: pause toggle not sent: {}", e);
    }
}

/// Drive the viewer side until every rank has finished
fn run_viewer(viewer: &LoopbackViewer, handles: &[RankHandle], steer_interval: bool) {
    let mut root_frames = 0u32;
    let mut resumed = false;
    while !handles.iter().all(|h| h.is_finished()) {
        let Some(event) = viewer.recv_timeout(Duration::from_millis(50)) else {
            continue;
        };
        if let ViewerEvent::Frame {
            rank: 0,
            step,
            paused,
            ref meta,
            ..
        } = event
        {
            root_frames += 1;
            tracing::debug!(
                "Viewer got frame {} (step {}, paused {}, time step {:?})",
                root_frames,
                step,
                paused,
                meta.get("time step")
            );

            if root_frames == SET_INTERVAL_AFTER && steer_interval {
                tracing::info!("Viewer: render every 2nd step");
                viewer.send(json!({"interval": 2}));
            }
            if root_frames == PAUSE_AFTER {
                tracing::info!("Viewer: pause");
                send_toggle(viewer);
            }
            if paused && !resumed {
                thread::sleep(Duration::from_millis(200));
                tracing::info!("Viewer: resume");
                send_toggle(viewer);
                resumed = true;
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            VisConfig::load(&path).with_context(|| format!("Failed to load config {}", path))?
        }
        None => VisConfig::default(),
    };
    let _guard = init_logging(config.log_dir.as_deref());

    tracing::info!(
        "Starting insitu-steer demo: {} ranks, {} steps, viewer at {}",
        PROC_GRID.iter().product::<u32>(),
        STEPS,
        config.endpoint()
    );

    let ranks: u32 = PROC_GRID.iter().product();
    let (viewer, pipelines) = LoopbackViewer::new(ranks);
    // interval changes reach the ranks at different steps, which would
    // misalign benchmark rows across ranks
    let steer_interval = !config.is_benchmarking();

    let mut handles = Vec::with_capacity(ranks as usize);
    for (collective, pipeline) in LocalCollective::group(ranks).into_iter().zip(pipelines) {
        let config = config.clone();
        let handle = thread::Builder::new()
            .name(format!("rank-{}", collective.rank()))
            .spawn(move || run_rank(config, collective, pipeline))
            .context("Failed to spawn rank thread")?;
        handles.push(handle);
    }

    run_viewer(&viewer, &handles, steer_interval);

    let mut exit_requested = false;
    for handle in handles {
        match handle.join() {
            Ok(Ok(report)) => tracing::info!(
                "Rank {} rendered {} steps in {} cycles",
                report.rank,
                report.rendered_steps,
                report.cycles
            ),
            Ok(Err(VisError::ExitRequested)) => exit_requested = true,
            Ok(Err(e)) => return Err(e).context("Rank failed"),
            Err(_) => anyhow::bail!("Rank thread panicked"),
        }
    }

    if exit_requested {
        tracing::info!("Exit requested by viewer");
        std::process::exit(1);
    }

    tracing::info!("Shutting down...");
    Ok(())
}
