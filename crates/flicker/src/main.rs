use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use flicker::{AnimatedSource, AssetType, FrameStore, ImageSource, PlaybackConfig};

const READY_TIMEOUT: Duration = Duration::from_secs(10);
/// Loops simulated when playback would otherwise run forever.
const DEFAULT_LOOP_BUDGET: usize = 3;

struct Args {
    path: PathBuf,
    loops: Option<i32>,
    save_config: bool,
}

fn parse_args() -> Result<Args> {
    let mut path = None;
    let mut loops = None;
    let mut save_config = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--loops" => {
                let value = args.next().context("--loops needs a value")?;
                loops = Some(value.parse().with_context(|| format!("invalid --loops '{value}'"))?);
            }
            "--save-config" => save_config = true,
            other if other.starts_with("--") => bail!("unknown flag '{other}'"),
            other => path = Some(PathBuf::from(other)),
        }
    }
    let path = path.context("usage: flicker <image> [--loops N] [--save-config]")?;
    Ok(Args {
        path,
        loops,
        save_config,
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let mut config = PlaybackConfig::load();
    if let Some(loops) = args.loops {
        config.animation.loop_count = loops;
    }
    if args.save_config {
        config.save();
    }

    let bytes = std::fs::read(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let asset_type = AssetType::detect(Some(bytes.as_slice()));
    log::info!("{}: detected {asset_type}", args.path.display());
    if asset_type.is_video() {
        bail!("{asset_type} is a video container; only animated images play here");
    }

    let source = AnimatedSource::from_bytes(&bytes)
        .with_context(|| format!("failed to decode {}", args.path.display()))?;
    let frame_count = source.frame_count();
    if !asset_type.is_animatable() {
        log::info!("{asset_type} plays as a single still frame");
    }
    let mut store = FrameStore::new(Arc::new(source), &config.animation)?;

    if !store.wait_ready(READY_TIMEOUT) {
        bail!("frame store not ready after {READY_TIMEOUT:?}");
    }

    let loop_budget = match config.max_loops_to_play {
        Some(max) => max,
        None if config.animation.loop_count > 0 => usize::MAX,
        None => DEFAULT_LOOP_BUDGET,
    };
    let refresh = config.refresh_interval();
    let mut simulated = Duration::ZERO;
    let mut changes = 0usize;

    if store.is_animatable() {
        while !store.is_finished() && store.current_loop() < loop_budget {
            simulated += refresh;
            if store.tick(refresh) {
                changes += 1;
                log::debug!(
                    "{:>8.3}s frame {} (loop {}){}",
                    simulated.as_secs_f64(),
                    store.current_frame_index(),
                    store.current_loop(),
                    if store.current_image().is_some() { "" } else { " [loading]" }
                );
            }
        }
    } else {
        log::info!("Single frame; nothing to animate");
    }

    log::info!(
        "{frame_count} frames, loop {:?}, {changes} frame changes over {:.2}s simulated, \
         {} loop(s), finished: {}, ~{} KiB",
        store.loop_duration().unwrap_or_default(),
        simulated.as_secs_f64(),
        store.current_loop(),
        store.is_finished(),
        store.estimated_memory_cost() / 1024
    );
    Ok(())
}
