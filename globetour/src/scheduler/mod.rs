//! Slideshow scheduler.
//!
//! [`SlideshowScheduler`] is the only component with scheduling authority.
//! It owns the POI sequence and its cursor, and drives the passive services
//! ([`CameraController`], [`PopupLayer`], [`MarkerLayer`],
//! [`RotationAnimator`], [`DelayGate`]) through one step per POI:
//!
//! ```text
//! ┌─ guard ─────────────────────────────────────────────────────────────┐
//! │ Flying    region changed? purge trailing; fly_to; render trailing;  │
//! │           show primary                                              │
//! │ Waiting   DelayGate::wait(slide delay)   ◄── set_slide_delay        │
//! │           hide primary; push trailing                               │
//! │ Rotating  recentered rotation                                       │
//! │           cursor = (cursor + 1) % len                               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Mutual exclusion
//!
//! Every path that runs a step (the background loop and
//! [`trigger_step`](SlideshowScheduler::trigger_step)) goes through a single
//! step guard. A trigger that finds the guard taken is dropped and reported
//! as [`StepOutcome::Busy`].
//!
//! # Teardown
//!
//! [`stop`](SlideshowScheduler::stop) cancels the frame loop and the pending
//! delay, removes every popup and marker, and sets a stopped flag that every
//! entry point checks before acting. A surface that detaches mid-step leads
//! to the same teardown without an error.
//!
//! Steps are cancel-safe: dropping a [`trigger_step`](SlideshowScheduler::trigger_step)
//! future mid-step frees the pending delay and hides the primary popup. A
//! manual step still running when `stop` returns removes its own
//! overlays on exit.

mod error;
mod state;

pub use error::SchedulerError;
pub use state::{SchedulerState, SlideshowEvent, StepOutcome};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::camera::CameraController;
use crate::config::SlideshowConfig;
use crate::delay::{DelayGate, DelayOutcome};
use crate::marker::MarkerLayer;
use crate::poi::{ImageResolver, Poi, RegionKey};
use crate::popup::PopupLayer;
use crate::rotation::{RotationAnimator, RotationMode, RotationOutcome};
use crate::surface::{MapSurface, SurfaceError};

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Step guard
// =============================================================================

/// Holds the step flag for as long as it lives.
struct StepGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> StepGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Takes down a step's overlays when the step is abandoned.
///
/// A step future dropped while its primary popup is up hides it. A step that
/// outlives teardown removes whatever it created after the teardown sweep.
struct StepCleanup<'a> {
    inner: &'a Inner,
    primary_shown: bool,
}

impl<'a> StepCleanup<'a> {
    fn new(inner: &'a Inner) -> Self {
        Self {
            inner,
            primary_shown: false,
        }
    }
}

impl Drop for StepCleanup<'_> {
    fn drop(&mut self) {
        if self.inner.is_stopped() {
            self.inner.popups.clear_all();
            self.inner.markers.clear_all();
        } else if self.primary_shown {
            debug!("Step abandoned, hiding primary popup");
            self.inner.popups.hide_primary();
        }
    }
}

// =============================================================================
// Shared state
// =============================================================================

#[derive(Debug)]
struct Session {
    state: SchedulerState,
    cursor: usize,
    pois: Arc<[Poi]>,
    last_region: Option<RegionKey>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            cursor: 0,
            pois: Arc::from(Vec::new()),
            last_region: None,
        }
    }
}

struct Inner {
    config: SlideshowConfig,
    slide_delay: Mutex<Duration>,
    camera: Arc<CameraController>,
    popups: Arc<PopupLayer>,
    markers: Arc<MarkerLayer>,
    rotation: RotationAnimator,
    gate: DelayGate,
    session: Mutex<Session>,
    step_active: AtomicBool,
    stopped: AtomicBool,
    steps_completed: AtomicU64,
    cancel: CancellationToken,
    events: broadcast::Sender<SlideshowEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Drives the presentation.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SlideshowScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SlideshowScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.session.lock();
        f.debug_struct("SlideshowScheduler")
            .field("state", &session.state)
            .field("cursor", &session.cursor)
            .field("pois", &session.pois.len())
            .field("stopped", &self.inner.stopped.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl SlideshowScheduler {
    /// Build a scheduler and its collaborators around `surface`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] when `config` does not validate.
    pub fn new(
        surface: Arc<dyn MapSurface>,
        config: SlideshowConfig,
        images: Arc<dyn ImageResolver>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;

        let camera = Arc::new(CameraController::new(surface.clone(), config.flight));
        let popups = Arc::new(PopupLayer::new(
            surface.clone(),
            images,
            config.popup_style,
            config.trailing_capacity,
        ));
        let markers = Arc::new(MarkerLayer::new(
            surface,
            popups.clone(),
            config.marker_zoom_threshold,
        ));
        let rotation = RotationAnimator::new(
            camera.clone(),
            popups.clone(),
            markers.clone(),
            config.frame_interval,
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                slide_delay: Mutex::new(config.slide_delay),
                config,
                camera,
                popups,
                markers,
                rotation,
                gate: DelayGate::new(),
                session: Mutex::new(Session::default()),
                step_active: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                steps_completed: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                events,
                task: Mutex::new(None),
            }),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load `pois` and start the presentation loop in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::EmptySequence`] when `pois` is empty; the
    ///   scheduler stays idle.
    /// - [`SchedulerError::AlreadyRunning`] when the loop is already running.
    /// - [`SchedulerError::Stopped`] after [`stop`](Self::stop).
    pub fn start(&self, pois: Vec<Poi>) -> Result<(), SchedulerError> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        if pois.is_empty() {
            error!("No points of interest to present, slideshow not started");
            return Err(SchedulerError::EmptySequence);
        }

        let mut task = self.inner.task.lock();
        if task.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let count = pois.len();
        self.inner.load_sequence(pois.into())?;

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { inner.run().await }));
        info!(pois = count, delay_secs = self.slide_delay().as_secs_f64(), "Slideshow started");
        Ok(())
    }

    /// Tear everything down and wait for the background loop to exit.
    ///
    /// Safe to call more than once and before `start`.
    pub async fn stop(&self) {
        self.inner.shutdown();
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(error = %e, "Slideshow loop panicked");
                }
            }
        }
        // The loop may have raced one last overlay in before it saw the flag
        self.inner.popups.clear_all();
        self.inner.markers.clear_all();
    }

    /// Run one step at the current cursor, unless one is already in flight.
    ///
    /// Goes through the same guard as the background loop, so it can never
    /// overlap an automatic step.
    pub async fn trigger_step(&self) -> Result<StepOutcome, SchedulerError> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        if self.inner.session.lock().pois.is_empty() {
            return Err(SchedulerError::EmptySequence);
        }
        let outcome = self.inner.step().await;
        if self.inner.task.lock().is_none() {
            self.inner.set_state_if_running(SchedulerState::Idle);
        }
        outcome
    }

    // =========================================================================
    // Host callbacks
    // =========================================================================

    /// Change the time each POI stays on screen.
    ///
    /// A wait already in progress is redirected to complete `delay` from
    /// now.
    pub fn set_slide_delay(&self, delay: Duration) -> Result<(), SchedulerError> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        if delay.is_zero() {
            return Err(SchedulerError::InvalidDelay(delay));
        }
        *self.inner.slide_delay.lock() = delay;
        let redirected = self.inner.gate.redirect(delay);
        info!(delay_secs = delay.as_secs_f64(), redirected, "Slide delay changed");
        Ok(())
    }

    /// Forward a camera zoom change from the host.
    pub fn on_zoom_changed(&self, zoom: f64) {
        if self.is_stopped() {
            return;
        }
        match self.inner.markers.on_zoom_changed(zoom) {
            Ok(()) => {}
            Err(SurfaceError::Detached) => debug!(zoom, "Zoom change ignored, surface detached"),
            Err(e) => warn!(zoom, error = %e, "Failed to update markers for zoom change"),
        }
    }

    /// Replace the POI sequence of a running presentation.
    ///
    /// The cursor restarts at the first POI. An empty sequence is rejected
    /// and the current one kept.
    pub fn replace_pois(&self, pois: Vec<Poi>) -> Result<(), SchedulerError> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        if pois.is_empty() {
            warn!("Ignoring empty POI replacement");
            return Err(SchedulerError::EmptySequence);
        }
        info!(pois = pois.len(), "POI sequence replaced");
        self.inner.load_sequence(pois.into())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> SchedulerState {
        self.inner.session.lock().state
    }

    /// Index of the POI the current (or next) step presents.
    pub fn cursor(&self) -> usize {
        self.inner.session.lock().cursor
    }

    pub fn poi_count(&self) -> usize {
        self.inner.session.lock().pois.len()
    }

    pub fn slide_delay(&self) -> Duration {
        *self.inner.slide_delay.lock()
    }

    /// Number of steps that ran to completion.
    pub fn steps_completed(&self) -> u64 {
        self.inner.steps_completed.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.is_stopped()
    }

    /// POI ids in the trailing window, oldest first.
    pub fn trailing_ids(&self) -> Vec<String> {
        self.inner.popups.trailing_ids()
    }

    pub fn config(&self) -> &SlideshowConfig {
        &self.inner.config
    }

    pub fn camera(&self) -> &Arc<CameraController> {
        &self.inner.camera
    }

    pub fn popups(&self) -> &Arc<PopupLayer> {
        &self.inner.popups
    }

    pub fn markers(&self) -> &Arc<MarkerLayer> {
        &self.inner.markers
    }

    /// Subscribe to scheduler events.
    ///
    /// Slow receivers lag and lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<SlideshowEvent> {
        self.inner.events.subscribe()
    }
}

// =============================================================================
// Loop and step protocol
// =============================================================================

impl Inner {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn emit(&self, event: SlideshowEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn load_sequence(&self, pois: Arc<[Poi]>) -> Result<(), SchedulerError> {
        {
            let mut session = self.session.lock();
            session.pois = Arc::clone(&pois);
            session.cursor = 0;
        }
        self.markers.set_pois(pois)?;
        let zoom = self.camera.zoom()?;
        self.markers.on_zoom_changed(zoom)?;
        Ok(())
    }

    fn set_phase(&self, phase: SchedulerState, cursor: usize) {
        if !self.set_state_if_running(phase) {
            return;
        }
        debug!(%phase, cursor, "Phase changed");
        self.emit(SlideshowEvent::PhaseChanged { cursor, phase });
    }

    /// Set `state` unless already stopped. Returns whether it was set.
    fn set_state_if_running(&self, state: SchedulerState) -> bool {
        let mut session = self.session.lock();
        if session.state == SchedulerState::Stopped {
            return false;
        }
        session.state = state;
        true
    }

    async fn run(self: Arc<Self>) {
        match self.opening_rotation().await {
            Ok(StepOutcome::Completed) | Ok(StepOutcome::Busy) => {}
            Ok(StepOutcome::Cancelled) => return,
            Ok(StepOutcome::SurfaceLost) => {
                self.surface_lost();
                return;
            }
            Err(e) => {
                self.fail(e);
                return;
            }
        }

        loop {
            if self.is_stopped() {
                break;
            }
            match self.step().await {
                Ok(StepOutcome::Completed) => {}
                Ok(StepOutcome::Busy) => {
                    // A manual step holds the guard; retry on the next frame
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.frame_interval) => {}
                    }
                }
                Ok(StepOutcome::Cancelled) => break,
                Ok(StepOutcome::SurfaceLost) => {
                    self.surface_lost();
                    break;
                }
                Err(e) => {
                    self.fail(e);
                    break;
                }
            }
        }
        debug!("Slideshow loop exited");
    }

    /// In-place rotation played once before the first step.
    async fn opening_rotation(&self) -> Result<StepOutcome, SchedulerError> {
        if self.config.opening_rotation.is_zero() {
            return Ok(StepOutcome::Completed);
        }
        let Some(_guard) = StepGuard::try_acquire(&self.step_active) else {
            return Ok(StepOutcome::Busy);
        };
        let cursor = self.session.lock().cursor;
        self.set_phase(SchedulerState::Rotating, cursor);

        let outcome = self
            .rotation
            .rotate(
                self.config.opening_rotation,
                self.config.opening_rotation_degrees,
                RotationMode::InPlace,
                &self.cancel,
            )
            .await;
        Ok(rotation_to_step(outcome))
    }

    async fn step(&self) -> Result<StepOutcome, SchedulerError> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        let Some(_guard) = StepGuard::try_acquire(&self.step_active) else {
            debug!("Step already in flight, trigger dropped");
            return Ok(StepOutcome::Busy);
        };

        match self.run_step().await {
            Err(e) if e.is_surface_lost() => Ok(StepOutcome::SurfaceLost),
            other => other,
        }
    }

    async fn run_step(&self) -> Result<StepOutcome, SchedulerError> {
        let (sequence, cursor, poi, region, region_changed) = {
            let mut session = self.session.lock();
            if session.pois.is_empty() {
                return Err(SchedulerError::EmptySequence);
            }
            let cursor = session.cursor % session.pois.len();
            let poi = session.pois[cursor].clone();
            let region = poi.region();
            let changed = session.last_region.as_ref() != Some(&region);
            session.last_region = Some(region.clone());
            (Arc::clone(&session.pois), cursor, poi, region, changed)
        };

        debug!(cursor, poi = %poi.id, %region, "Step started");
        self.emit(SlideshowEvent::StepStarted {
            cursor,
            poi_id: poi.id.clone(),
        });

        let mut cleanup = StepCleanup::new(self);

        // Flying
        self.set_phase(SchedulerState::Flying, cursor);
        if region_changed {
            self.popups.purge_trailing();
        }
        self.camera.fly_to(poi.position(), self.config.fly_zoom)?;
        if self.is_stopped() {
            return Ok(StepOutcome::Cancelled);
        }
        self.popups.render_trailing()?;
        self.popups.show_primary(&poi)?;
        cleanup.primary_shown = true;

        // Waiting
        self.set_phase(SchedulerState::Waiting, cursor);
        let delay = *self.slide_delay.lock();
        let wait = self.gate.wait(delay)?;
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.gate.cancel();
                DelayOutcome::Cancelled
            }
            outcome = wait => outcome,
        };
        if outcome == DelayOutcome::Cancelled || self.is_stopped() {
            return Ok(StepOutcome::Cancelled);
        }
        self.popups.hide_primary();
        cleanup.primary_shown = false;
        self.popups.push_trailing(&poi, &region)?;

        // Rotating
        self.set_phase(SchedulerState::Rotating, cursor);
        let mode = RotationMode::Recentered {
            target: self.config.recenter_target,
            restore_camera: self.config.restore_camera,
        };
        let rotated = self
            .rotation
            .rotate(
                self.config.rotation_duration,
                self.config.rotation_degrees,
                mode,
                &self.cancel,
            )
            .await;
        match rotation_to_step(rotated) {
            StepOutcome::Completed => {}
            other => return Ok(other),
        }

        let next = {
            let mut session = self.session.lock();
            // A sequence replaced mid-step keeps its fresh cursor
            if Arc::ptr_eq(&session.pois, &sequence) {
                session.cursor = (cursor + 1) % session.pois.len();
            }
            session.cursor
        };
        self.steps_completed.fetch_add(1, Ordering::AcqRel);
        debug!(cursor, next, poi = %poi.id, "Step completed");
        self.emit(SlideshowEvent::StepCompleted {
            cursor,
            poi_id: poi.id,
            next,
        });
        Ok(StepOutcome::Completed)
    }

    /// Stop everything. Idempotent.
    fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.cancel.cancel();
        self.gate.cancel();
        self.popups.clear_all();
        self.markers.clear_all();

        let was_stopped = {
            let mut session = self.session.lock();
            std::mem::replace(&mut session.state, SchedulerState::Stopped)
                == SchedulerState::Stopped
        };
        if !was_stopped {
            info!(
                steps = self.steps_completed.load(Ordering::Acquire),
                "Slideshow stopped"
            );
            self.emit(SlideshowEvent::Stopped);
        }
    }

    fn surface_lost(&self) {
        info!("Map surface detached, stopping slideshow");
        self.shutdown();
    }

    fn fail(&self, e: SchedulerError) {
        error!(error = %e, "Slideshow run aborted");
        self.shutdown();
    }
}

fn rotation_to_step(outcome: RotationOutcome) -> StepOutcome {
    match outcome {
        RotationOutcome::Completed => StepOutcome::Completed,
        RotationOutcome::Cancelled => StepOutcome::Cancelled,
        RotationOutcome::SurfaceLost => StepOutcome::SurfaceLost,
    }
}
