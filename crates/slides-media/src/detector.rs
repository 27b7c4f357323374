//! Slide-change detection over a stream of captured frames.
//!
//! [`DetectorCore`] is the state machine: it decides, frame by frame, when
//! the screen has settled on new content. [`SlideDetector`] drives it from
//! an [`AdaptiveTicker`], turns commits into [`Slide`]s and hands them to a
//! [`SlideSink`].

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use slides_models::{slide_title, Frame, Slide, SlideId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::encode::encode_png;
use crate::error::{MediaError, MediaResult};
use crate::pool::FrameComparator;
use crate::similarity::SsimConfig;
use crate::threshold::SsimPreset;
use crate::ticker::{run_ticks, AdaptiveTicker};

/// Grid spacing of the near-black probe, in pixels.
const SAMPLE_STEP: usize = 10;
/// Upper bound on probed pixels per frame.
const MAX_SAMPLES: usize = 100;
/// Upper bound on the probe radius, in pixels.
const MAX_SAMPLE_RADIUS: i64 = 50;

const EVENT_BUFFER: usize = 64;

// ============================================================================
// Collaborators
// ============================================================================

/// Where frames come from, typically a video element being played back.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Whether a frame can be captured right now.
    fn ready(&self) -> bool;

    /// Capture the frame currently on screen.
    async fn current_frame(&self) -> MediaResult<Option<Frame>>;
}

/// Persists committed slides.
#[async_trait]
pub trait SlideSink: Send + Sync {
    async fn write_slide(&self, slide: &Slide) -> MediaResult<()>;
}

/// Notifications emitted by a running detector.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    SlideCommitted {
        id: SlideId,
        title: String,
        filename: String,
    },
    /// The slide was committed but could not be written
    StorageFailed { filename: String, error: String },
}

// ============================================================================
// Configuration
// ============================================================================

/// Detector settings. Changes apply from the next tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub ssim: SsimConfig,
    /// Require a changed frame to stay put before committing it
    pub dual_verification: bool,
    /// Number of consecutive matching frames needed to confirm a candidate
    pub verification_count: u32,
    /// Capture interval at 1x playback
    pub base_interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            ssim: SsimConfig::default(),
            dual_verification: true,
            verification_count: 2,
            base_interval: Duration::from_millis(2000),
        }
    }
}

impl DetectorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let preset_threshold = std::env::var("SSIM_PRESET")
            .ok()
            .and_then(|s| s.parse::<SsimPreset>().ok())
            .map(|p| p.threshold());
        let threshold = std::env::var("SSIM_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .or(preset_threshold)
            .unwrap_or(defaults.ssim.threshold);

        Self {
            ssim: SsimConfig {
                threshold,
                downsample_enabled: std::env::var("DOWNSAMPLE_ENABLED")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.ssim.downsample_enabled),
                downsample_width: std::env::var("DOWNSAMPLE_WIDTH")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.ssim.downsample_width),
                downsample_height: std::env::var("DOWNSAMPLE_HEIGHT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.ssim.downsample_height),
            },
            dual_verification: std::env::var("DUAL_VERIFICATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.dual_verification),
            verification_count: std::env::var("VERIFICATION_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.verification_count),
            base_interval: std::env::var("CHECK_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_interval),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.ssim.validate()?;
        if self.dual_verification && self.verification_count == 0 {
            return Err("verification_count must be at least 1".to_string());
        }
        if self.base_interval.is_zero() {
            return Err("base_interval must be non-zero".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorState {
    /// No baseline yet
    #[default]
    Idle,
    /// Watching for a change from the baseline
    Stable,
    /// Waiting for a changed frame to hold still
    Verifying,
}

/// What the runner should do after a frame was processed.
#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    Continue,
    Commit(Arc<Frame>),
}

#[derive(Debug, Default)]
pub struct DetectorCore {
    state: DetectorState,
    baseline: Option<Arc<Frame>>,
    candidate: Option<Arc<Frame>>,
    confirmations: u32,
}

impl DetectorCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn baseline(&self) -> Option<&Arc<Frame>> {
        self.baseline.as_ref()
    }

    /// Drop all held frames and go back to `Idle`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn commit(&mut self, frame: Arc<Frame>) -> TickAction {
        self.baseline = Some(Arc::clone(&frame));
        self.candidate = None;
        self.confirmations = 0;
        self.state = DetectorState::Stable;
        TickAction::Commit(frame)
    }

    fn reject_candidate(&mut self) -> TickAction {
        self.candidate = None;
        self.confirmations = 0;
        self.state = DetectorState::Stable;
        TickAction::Continue
    }

    /// Feed one captured frame.
    ///
    /// A comparison error leaves the state untouched.
    pub async fn process_frame(
        &mut self,
        frame: Arc<Frame>,
        comparator: &dyn FrameComparator,
        config: &DetectorConfig,
    ) -> MediaResult<TickAction> {
        match self.state {
            DetectorState::Idle => Ok(self.commit(frame)),

            DetectorState::Stable => {
                let Some(baseline) = self.baseline.clone() else {
                    return Ok(self.commit(frame));
                };
                if !comparator.changed(&baseline, &frame, &config.ssim).await? {
                    return Ok(TickAction::Continue);
                }
                if !config.dual_verification {
                    return Ok(self.commit(frame));
                }

                debug!("Content changed, verifying candidate");
                self.candidate = Some(frame);
                self.confirmations = 0;
                self.state = DetectorState::Verifying;
                Ok(TickAction::Continue)
            }

            DetectorState::Verifying => {
                let Some(candidate) = self.candidate.clone() else {
                    return Ok(self.reject_candidate());
                };
                if comparator.changed(&candidate, &frame, &config.ssim).await? {
                    debug!("Candidate still changing, discarded");
                    return Ok(self.reject_candidate());
                }

                self.confirmations += 1;
                if self.confirmations >= config.verification_count.max(1) {
                    Ok(self.commit(candidate))
                } else {
                    Ok(TickAction::Continue)
                }
            }
        }
    }
}

/// Whether a frame has any visible content near its centre.
///
/// Black frames show up while a stream is buffering or switching sources.
pub fn is_valid_frame(frame: &Frame) -> bool {
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    let (cx, cy) = (w / 2, h / 2);
    let radius = MAX_SAMPLE_RADIUS.min(w.min(h) / 4);

    let offsets = (-radius..=radius).step_by(SAMPLE_STEP);
    offsets
        .clone()
        .flat_map(|dy| offsets.clone().map(move |dx| (cx + dx, cy + dy)))
        .take(MAX_SAMPLES)
        .filter_map(|(x, y)| frame.pixel(x as u32, y as u32))
        .any(|[r, g, b, _]| r != 0 || g != 0 || b != 0)
}

// ============================================================================
// Runner
// ============================================================================

struct Shared {
    source: Arc<dyn FrameSource>,
    comparator: Arc<dyn FrameComparator>,
    sink: Arc<dyn SlideSink>,
    config: RwLock<DetectorConfig>,
    core: tokio::sync::Mutex<DetectorCore>,
    slides: RwLock<Vec<Arc<Slide>>>,
    events: mpsc::Sender<DetectorEvent>,
}

impl Shared {
    async fn tick(&self) {
        if !self.source.ready() {
            debug!("Frame source not ready, skipping tick");
            return;
        }

        let frame = match self.source.current_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Frame capture failed, skipping tick");
                return;
            }
        };
        if !is_valid_frame(&frame) {
            debug!("Near-black frame, skipping tick");
            return;
        }

        let config = self.config.read().unwrap().clone();
        let mut core = self.core.lock().await;
        let action = match core
            .process_frame(Arc::new(frame), self.comparator.as_ref(), &config)
            .await
        {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "Frame comparison failed, skipping tick");
                return;
            }
        };

        if let TickAction::Commit(frame) = action {
            if let Err(e) = self.commit(frame).await {
                error!(error = %e, "Failed to commit slide");
            }
        }
    }

    async fn commit(&self, frame: Arc<Frame>) -> MediaResult<()> {
        let number = self.slides.read().unwrap().len() + 1;

        let to_encode = Arc::clone(&frame);
        let encoded = tokio::task::spawn_blocking(move || encode_png(&to_encode))
            .await
            .map_err(|e| MediaError::internal(format!("encoder task failed: {}", e)))??;

        let slide = Slide::new(slide_title(number), (*frame).clone(), encoded);
        info!(
            slide_id = %slide.id,
            title = %slide.title,
            bytes = slide.encoded.len(),
            "Committed slide"
        );

        if let Err(e) = self.sink.write_slide(&slide).await {
            error!(filename = slide.filename(), error = %e, "Failed to write slide");
            self.emit(DetectorEvent::StorageFailed {
                filename: slide.filename().to_string(),
                error: e.to_string(),
            });
        }

        self.emit(DetectorEvent::SlideCommitted {
            id: slide.id.clone(),
            title: slide.title.clone(),
            filename: slide.filename().to_string(),
        });
        self.slides.write().unwrap().push(Arc::new(slide));
        Ok(())
    }

    fn emit(&self, event: DetectorEvent) {
        // Drop rather than stall the ticker when nobody is listening.
        let _ = self.events.try_send(event);
    }
}

struct RunHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Periodically captures frames and commits new slides.
pub struct SlideDetector {
    shared: Arc<Shared>,
    ticker: Mutex<AdaptiveTicker>,
    running: Mutex<Option<RunHandle>>,
}

impl SlideDetector {
    /// Create a stopped detector and the receiver for its events.
    pub fn new(
        source: Arc<dyn FrameSource>,
        comparator: Arc<dyn FrameComparator>,
        sink: Arc<dyn SlideSink>,
        config: DetectorConfig,
    ) -> MediaResult<(Self, mpsc::Receiver<DetectorEvent>)> {
        config.validate().map_err(MediaError::invalid_config)?;

        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let ticker = AdaptiveTicker::new(config.base_interval);
        let shared = Arc::new(Shared {
            source,
            comparator,
            sink,
            config: RwLock::new(config),
            core: tokio::sync::Mutex::new(DetectorCore::new()),
            slides: RwLock::new(Vec::new()),
            events,
        });

        Ok((
            Self {
                shared,
                ticker: Mutex::new(ticker),
                running: Mutex::new(None),
            },
            rx,
        ))
    }

    /// Begin a new capture session. Does nothing if already running.
    pub async fn start(&self) {
        if self.is_running() {
            return;
        }

        self.shared.core.lock().await.reset();
        self.shared.slides.write().unwrap().clear();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let period_rx = self.ticker.lock().unwrap().subscribe();
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(run_ticks(period_rx, shutdown_rx, move || {
            let shared = Arc::clone(&shared);
            async move { shared.tick().await }
        }));

        info!(period_ms = self.period().as_millis() as u64, "Slide detector started");
        *self.running.lock().unwrap() = Some(RunHandle { shutdown, task });
    }

    /// Stop ticking and discard any held baseline or candidate.
    ///
    /// A tick in progress is abandoned, so nothing is committed after this is called.
    pub async fn stop(&self) {
        let handle = self.running.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(true);
            if let Err(e) = handle.task.await {
                warn!(error = %e, "Detector task ended abnormally");
            }
            info!(slides = self.committed_count(), "Slide detector stopped");
        }
        self.shared.core.lock().await.reset();
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Run a single detection step outside the ticker.
    pub async fn tick_once(&self) {
        self.shared.tick().await;
    }

    pub fn set_playback_rate(&self, speed: f64) {
        self.ticker.lock().unwrap().set_playback_rate(speed);
    }

    pub fn set_base_interval(&self, base: Duration) {
        self.shared.config.write().unwrap().base_interval = base;
        self.ticker.lock().unwrap().set_base_interval(base);
    }

    /// Current effective tick period.
    pub fn period(&self) -> Duration {
        self.ticker.lock().unwrap().period()
    }

    /// Replace the configuration; the running ticker keeps its state.
    pub fn update_config(&self, config: DetectorConfig) -> MediaResult<()> {
        config.validate().map_err(MediaError::invalid_config)?;
        self.ticker.lock().unwrap().set_base_interval(config.base_interval);
        *self.shared.config.write().unwrap() = config;
        Ok(())
    }

    pub fn config(&self) -> DetectorConfig {
        self.shared.config.read().unwrap().clone()
    }

    /// Slides committed in the current session.
    pub fn slides(&self) -> Vec<Arc<Slide>> {
        self.shared.slides.read().unwrap().clone()
    }

    pub fn committed_count(&self) -> usize {
        self.shared.slides.read().unwrap().len()
    }

    pub async fn state(&self) -> DetectorState {
        self.shared.core.lock().await.state()
    }
}
