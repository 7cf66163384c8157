//! Frame submission actor
//!
//! [`ChunkedEncoder`] is the handle producers talk to. Every frame and the
//! stop request become an [`EncodeTask`] on one FIFO channel, and a single
//! worker thread executes the tasks in order. All chunk, encoder and counter
//! state lives on that thread, so none of it is locked.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use super::coordinator::ChunkCoordinator;
use super::drain::DrainLoop;
use super::stats::{PipelineStats, PipelineStatsSnapshot};
use crate::config::ChunkerConfig;
use crate::error::{AppError, Result};
use crate::events::{ChunkEvent, EventBus};
use crate::utils::LogThrottler;
use crate::video::encoder::{EncoderFactory, PassthroughEncoderFactory};
use crate::video::frame::VideoFrame;
use crate::video::muxer::{SampleFileWriterFactory, WriterFactory};
use crate::video::output::{DirectoryAllocator, OutputAllocator};
use crate::warn_throttled;

/// Pipeline lifecycle as seen from outside the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Accepting frames
    Running,
    /// Stop requested, queued work still draining
    Stopping,
    /// Every chunk finalized after a stop request
    Stopped,
    /// A fatal error ended the pipeline
    Failed(String),
}

impl PipelineStatus {
    /// Whether the worker has exited
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Stopped | PipelineStatus::Failed(_))
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Running => write!(f, "running"),
            PipelineStatus::Stopping => write!(f, "stopping"),
            PipelineStatus::Stopped => write!(f, "stopped"),
            PipelineStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Work item for the worker thread
#[derive(Debug)]
enum EncodeTask {
    SubmitFrame(VideoFrame),
    FinalizeStream,
}

/// Counters and flags owned by the worker
#[derive(Debug, Default)]
struct PipelineState {
    /// Frames processed across every chunk
    total_frames: u64,
    /// The active chunk reached its boundary or a stop arrived
    eos_requested: bool,
}

/// Chunked encoder handle
///
/// Cheap to share behind an `Arc`; `submit` and `request_stop` take `&self`
/// and never block on the encoder.
pub struct ChunkedEncoder {
    tx: mpsc::UnboundedSender<EncodeTask>,
    stop_requested: Arc<AtomicBool>,
    frames_per_chunk: u32,
    status: Arc<watch::Sender<PipelineStatus>>,
    status_rx: watch::Receiver<PipelineStatus>,
    events: EventBus,
    stats: Arc<PipelineStats>,
    worker: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl ChunkedEncoder {
    /// Start a pipeline with the passthrough encoder and sample file writer
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ChunkerConfig) -> ChunkedEncoderBuilder {
        ChunkedEncoderBuilder::new(config)
    }

    /// Queue a frame for encoding
    ///
    /// Returns immediately. Frames submitted after a stop request, or after
    /// the pipeline failed, are discarded.
    pub fn submit(&self, frame: VideoFrame) {
        if self.stop_requested.load(Ordering::Acquire) {
            trace!("Pipeline stopping, frame discarded");
            return;
        }
        if self.tx.send(EncodeTask::SubmitFrame(frame)).is_ok() {
            self.stats.frame_submitted();
        }
    }

    /// Ask the pipeline to finish every queued frame and stop
    ///
    /// Idempotent.
    pub fn request_stop(&self) {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Stop requested");
        self.status.send_if_modified(|status| {
            if *status == PipelineStatus::Running {
                *status = PipelineStatus::Stopping;
                true
            } else {
                false
            }
        });
        if self.tx.send(EncodeTask::FinalizeStream).is_err() {
            debug!("Worker already exited");
        }
    }

    pub fn status(&self) -> PipelineStatus {
        self.status_rx.borrow().clone()
    }

    pub fn status_watch(&self) -> watch::Receiver<PipelineStatus> {
        self.status_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChunkEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn frames_per_chunk(&self) -> u32 {
        self.frames_per_chunk
    }

    /// Block until the worker exits
    ///
    /// The first caller receives the worker's fatal error, if any. Later
    /// callers get [`AppError::PipelineFailed`] for a failed pipeline.
    pub fn join(&self) -> Result<()> {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| AppError::WorkerPanicked)?,
            None => match self.status() {
                PipelineStatus::Failed(reason) => Err(AppError::PipelineFailed(reason)),
                _ => Ok(()),
            },
        }
    }

    /// Wait until the pipeline stops or fails
    pub async fn wait_stopped(&self) -> PipelineStatus {
        let mut rx = self.status_rx.clone();
        let result = rx.wait_for(|status| status.is_terminal()).await;
        match result {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        }
    }
}

impl Drop for ChunkedEncoder {
    fn drop(&mut self) {
        self.request_stop();
    }
}

/// Builder for [`ChunkedEncoder`]
pub struct ChunkedEncoderBuilder {
    config: ChunkerConfig,
    encoders: Option<Arc<dyn EncoderFactory>>,
    writers: Option<Arc<dyn WriterFactory>>,
    allocator: Option<Box<dyn OutputAllocator>>,
    events: Option<EventBus>,
}

impl ChunkedEncoderBuilder {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            encoders: None,
            writers: None,
            allocator: None,
            events: None,
        }
    }

    pub fn encoder_factory(mut self, factory: impl EncoderFactory + 'static) -> Self {
        self.encoders = Some(Arc::new(factory));
        self
    }

    pub fn writer_factory(mut self, factory: impl WriterFactory + 'static) -> Self {
        self.writers = Some(Arc::new(factory));
        self
    }

    /// Output target allocator, defaults to the configured directory
    pub fn allocator(mut self, allocator: impl OutputAllocator + 'static) -> Self {
        self.allocator = Some(Box::new(allocator));
        self
    }

    /// Publish on an existing bus, so subscribers see the first chunk start
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration, open chunk 1 and spawn the worker
    pub fn build(self) -> Result<ChunkedEncoder> {
        self.config.validate()?;
        let frames_per_chunk = self.config.frames_per_chunk();
        let events = self.events.unwrap_or_default();
        let stats = Arc::new(PipelineStats::new());

        let encoders = self
            .encoders
            .unwrap_or_else(|| Arc::new(PassthroughEncoderFactory::default()));
        let writers = self
            .writers
            .unwrap_or_else(|| Arc::new(SampleFileWriterFactory));
        let allocator = self
            .allocator
            .unwrap_or_else(|| Box::new(DirectoryAllocator::from_config(&self.config.output)));

        info!(
            "Creating chunked encoder: {} encoder, {} frames per chunk, {}",
            encoders.encoder_type(),
            frames_per_chunk,
            self.config.to_media_format()
        );

        let mut coordinator = ChunkCoordinator::new(
            self.config.to_media_format(),
            encoders,
            writers,
            allocator,
            DrainLoop::new(self.config.drain.poll_timeout(), self.config.drain.eos_timeout()),
            events.clone(),
            stats.clone(),
        );
        coordinator.start_next_chunk()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(PipelineStatus::Running);
        let status = Arc::new(status_tx);
        let stop_requested = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            rx,
            coordinator,
            frames_per_chunk,
            state: PipelineState::default(),
            stop_requested: stop_requested.clone(),
            status: status.clone(),
            events: events.clone(),
            stats: stats.clone(),
            throttler: LogThrottler::default(),
        };
        let handle = std::thread::Builder::new()
            .name("chunk-encoder".to_string())
            .spawn(move || worker.run())?;

        Ok(ChunkedEncoder {
            tx,
            stop_requested,
            frames_per_chunk,
            status,
            status_rx,
            events,
            stats,
            worker: Mutex::new(Some(handle)),
        })
    }
}

struct Worker {
    rx: mpsc::UnboundedReceiver<EncodeTask>,
    coordinator: ChunkCoordinator,
    frames_per_chunk: u32,
    state: PipelineState,
    stop_requested: Arc<AtomicBool>,
    status: Arc<watch::Sender<PipelineStatus>>,
    events: EventBus,
    stats: Arc<PipelineStats>,
    throttler: LogThrottler,
}

impl Worker {
    fn run(mut self) -> Result<()> {
        let result = self.process();

        let terminal = match &result {
            Ok(()) => {
                info!(
                    "Pipeline stopped: {} frames in {} chunks",
                    self.state.total_frames,
                    self.coordinator.chunk_index()
                );
                self.events.publish(ChunkEvent::PipelineStopped {
                    total_frames: self.state.total_frames,
                    chunks: self.stats.snapshot().chunks_finalized,
                });
                PipelineStatus::Stopped
            }
            Err(e) => {
                error!("Pipeline failed in chunk {}: {}", self.coordinator.chunk_index(), e);
                self.stop_requested.store(true, Ordering::Release);
                self.coordinator.abort();
                self.events.publish(ChunkEvent::PipelineFailed {
                    chunk: self.coordinator.chunk_index(),
                    message: e.to_string(),
                });
                PipelineStatus::Failed(e.to_string())
            }
        };

        // Whatever is still queued arrived after the stop or the failure
        self.rx.close();
        let mut dropped = 0u64;
        while let Ok(task) = self.rx.try_recv() {
            if let EncodeTask::SubmitFrame(_) = task {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!("Dropped {} frames queued after the pipeline ended", dropped);
            self.stats.frames_dropped(dropped);
        }

        self.status.send_replace(terminal);
        result
    }

    fn process(&mut self) -> Result<()> {
        while let Some(task) = self.rx.blocking_recv() {
            match task {
                EncodeTask::SubmitFrame(frame) => self.submit_frame(frame)?,
                EncodeTask::FinalizeStream => return self.finalize_stream(),
            }
        }
        // Every sender is gone without a stop request
        self.finalize_stream()
    }

    fn submit_frame(&mut self, frame: VideoFrame) -> Result<()> {
        if self.coordinator.active().is_none() {
            self.coordinator.start_next_chunk()?;
        }
        self.state.total_frames += 1;

        let session = self
            .coordinator
            .active_mut()
            .ok_or_else(|| AppError::Encoder("no active chunk after start".to_string()))?;
        let index = session.index();
        let (count, pts_us) = session.record_frame(frame.capture_ns);
        if pts_us < 0 {
            warn_throttled!(
                self.throttler,
                "pre_origin_pts",
                "Chunk {}: frame captured {} us before the chunk origin",
                index,
                -pts_us
            );
        }

        self.state.eos_requested = count >= self.frames_per_chunk;
        self.coordinator
            .encode_frame(&frame, pts_us, self.state.eos_requested)?;
        if self.state.eos_requested {
            self.rotate()?;
        }
        Ok(())
    }

    /// Finalize the chunk that just took its last frame
    ///
    /// The next chunk opens with the next frame, so a stop landing on a
    /// boundary leaves no empty chunk behind.
    fn rotate(&mut self) -> Result<()> {
        self.coordinator.finalize_chunk()?;
        self.state.eos_requested = false;
        debug!(
            "Chunk {} complete, next chunk opens on the next frame",
            self.coordinator.chunk_index()
        );
        Ok(())
    }

    fn finalize_stream(&mut self) -> Result<()> {
        if self.coordinator.active().is_some() {
            self.state.eos_requested = true;
            self.coordinator.finalize_chunk()?;
        }
        debug!("Stream finalized after {} frames", self.state.total_frames);
        Ok(())
    }
}
