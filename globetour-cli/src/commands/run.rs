//! Run command - present a POI file on an in-memory map surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use globetour::logging::{init_logging, LoggingConfig};
use globetour::poi::{load_pois, JsonFilePoiSource, Poi};
use globetour::surface::MemorySurface;
use globetour::{PlaceholderImages, SlideshowEvent, SlideshowScheduler};

use super::config::load_config;
use crate::error::CliError;

/// Arguments for the run command.
pub struct RunArgs {
    pub pois: PathBuf,
    pub config: Option<PathBuf>,
    pub delay_secs: Option<f64>,
    pub for_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
}

/// Run the run command.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let RunArgs {
        pois: pois_path,
        config: config_path,
        delay_secs,
        for_secs,
        log_file,
        log_level,
    } = args;

    let mut config = load_config(config_path.as_deref())?;
    if let Some(secs) = delay_secs {
        config.slide_delay = Duration::try_from_secs_f64(secs)
            .map_err(|e| CliError::Config(format!("Invalid --delay-secs {}: {}", secs, e)))?;
    }
    config.validate()?;

    let mut logging = LoggingConfig::default().with_level(log_level);
    if let Some(path) = log_file {
        logging = logging.with_file(path);
    }
    let _log_guard = init_logging(&logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(async move {
        let source = JsonFilePoiSource::new(&pois_path);
        let pois = load_pois(&source).await;

        println!("Globe Tour v{}", globetour::VERSION);
        println!("==============");
        println!();
        println!("POI file:    {}", pois_path.display());
        println!("POIs loaded: {}", pois.len());
        println!("Slide delay: {:?}", config.slide_delay);
        println!("Recenter:    {}", config.recenter_target);
        println!();

        let surface = Arc::new(MemorySurface::default());
        let scheduler = SlideshowScheduler::new(
            surface.clone(),
            config,
            Arc::new(PlaceholderImages::default()),
        )?;

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        ctrlc::set_handler(move || {
            println!();
            println!("Received shutdown signal, stopping...");
            signal.cancel();
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

        let mut lifecycle = scheduler.subscribe();
        if !start_presentation(&scheduler, pois)? {
            println!("No POIs to present, showing a static map");
        }
        println!("Press Ctrl+C to stop");
        println!();

        let zoom_task = tokio::spawn(forward_zoom(
            surface.clone(),
            scheduler.clone(),
            shutdown.clone(),
        ));
        let events_task = tokio::spawn(log_events(scheduler.clone(), shutdown.clone()));

        let run_time = async {
            match for_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        let stopped_on_its_own = async {
            loop {
                match lifecycle.recv().await {
                    Ok(SlideshowEvent::Stopped) | Err(RecvError::Closed) => break,
                    _ => {}
                }
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = run_time => info!(secs = ?for_secs, "Run time elapsed"),
            _ = stopped_on_its_own => info!("Slideshow stopped"),
        }

        shutdown.cancel();
        scheduler.stop().await;
        let _ = zoom_task.await;
        let _ = events_task.await;

        println!();
        println!("Session Summary");
        println!("───────────────");
        println!("  Steps completed: {}", scheduler.steps_completed());
        println!("  Camera flights:  {}", surface.flights().len());
        println!("  Camera jumps:    {}", surface.jump_count());
        println!("  Peak trailing:   {}", surface.peak_trailing_popups());
        Ok::<(), CliError>(())
    })
}

/// Start the slideshow, leaving the map static when there is nothing to show.
///
/// Returns whether the slideshow started.
fn start_presentation(scheduler: &SlideshowScheduler, pois: Vec<Poi>) -> Result<bool, CliError> {
    if pois.is_empty() {
        warn!("No points of interest loaded, slideshow not started");
        return Ok(false);
    }
    scheduler.start(pois)?;
    Ok(true)
}

/// Forward the surface's zoom changes to the scheduler, like a map widget's
/// zoom event would.
async fn forward_zoom(
    surface: Arc<MemorySurface>,
    scheduler: SlideshowScheduler,
    shutdown: CancellationToken,
) {
    let mut zoom = surface.zoom_changes();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = zoom.changed() => {
                if changed.is_err() {
                    break;
                }
                let level = *zoom.borrow_and_update();
                scheduler.on_zoom_changed(level);
            }
        }
    }
}

async fn log_events(scheduler: SlideshowScheduler, shutdown: CancellationToken) {
    let mut events = scheduler.subscribe();
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(SlideshowEvent::StepStarted { cursor, poi_id }) => {
                info!(cursor, poi = %poi_id, "Presenting");
            }
            Ok(SlideshowEvent::StepCompleted { poi_id, next, .. }) => {
                debug!(poi = %poi_id, next, "Presented");
            }
            Ok(SlideshowEvent::PhaseChanged { .. }) => {}
            Ok(SlideshowEvent::Stopped) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event log lagged"),
        }
    }
}
