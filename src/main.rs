use feedplay::analytics::{Analytics, ChannelSink};
use feedplay::cli::Args;
use feedplay::config::FeedPlayConfig;
use feedplay::core::clock::ManualClock;
use feedplay::core::coordinator::PlaybackCoordinator;
use feedplay::core::pool::PlayerPool;
use feedplay::core::sim::{SimControl, SimEngine};
use feedplay::core::surface::SimSurfaces;
use feedplay::feed::{FeedPager, MockFeedSource};

use anyhow::Context;
use clap::Parser;
use log::{debug, info};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Ticks of simulated time spent watching each video before swiping.
const TICKS_PER_VIEW: u32 = 6;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let default_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    info!("feedplay demo starting...");
    debug!("Command-line args: {:?}", args);

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            FeedPlayConfig::from_json(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => FeedPlayConfig::default(),
    };
    if let Some(capacity) = args.capacity {
        config.pool_capacity = capacity;
    }
    info!("config: {:?}", config);

    // Simulated wall clock, advanced one poll interval per loop iteration.
    let clock = ManualClock::new(0);
    let (sink, metrics_rx) = ChannelSink::new();
    let analytics = Analytics::new(Arc::new(sink), clock.clone());

    let mut controls: Vec<SimControl> = Vec::new();
    let pool = PlayerPool::new(config.pool_capacity, || {
        let engine = SimEngine::new(2);
        controls.push(engine.control());
        Box::new(engine)
    });
    let pager = FeedPager::new(Box::new(MockFeedSource::new(args.videos)), config.page_size);
    let surfaces = Rc::new(RefCell::new(SimSurfaces::new()));

    let poll_ms = config.progress_poll_interval_ms;
    let swipes = args.swipes;
    let mut coordinator = PlaybackCoordinator::new(
        pool,
        pager,
        Box::new(surfaces.clone()),
        analytics,
        clock.clone(),
        config,
    );

    // Views materialize one poll interval late, exercising the retry path.
    coordinator.start()?;
    let mut position = 0usize;

    for swipe in 0..=swipes {
        for tick in 0..TICKS_PER_VIEW {
            if tick == 1 {
                surfaces.borrow_mut().materialize(position);
            }
            clock.advance(poll_ms);
            for control in &controls {
                control.tick();
            }
            coordinator.tick()?;
        }

        if swipe == swipes {
            break;
        }
        let next = position + 1;
        if coordinator.pager().item(next).is_none() {
            info!("feed exhausted at position {}", position);
            break;
        }
        surfaces.borrow_mut().remove(position.saturating_sub(1));
        coordinator.on_drag_begin();
        clock.advance(poll_ms);
        coordinator.select_position(next)?;
        position = next;
    }

    println!("{}", coordinator.status());
    coordinator.teardown();

    let events: Vec<_> = metrics_rx.try_iter().collect();
    if args.metrics {
        for event in &events {
            println!(
                "{:>8}ms  {:<26} {}",
                event.timestamp_ms,
                event.name,
                serde_json::Value::Object(event.params.clone())
            );
        }
    }
    println!(
        "session over: {} positions watched, {} metrics events",
        position + 1,
        events.len()
    );
    Ok(())
}
