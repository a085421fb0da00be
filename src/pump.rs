//! Frame pump: the pipeline state machine.
//!
//! The pump owns the single active source and paces reads at the source's
//! effective interval. One tick is read → detect → annotate → publish, and the
//! next tick is only scheduled once the previous one has finished, so at most
//! one detection call is ever outstanding.
//!
//! Every blocking step runs without holding the pump:
//!
//! 1. [`FramePump::begin_tick`] lends the source out in a [`ReadJob`].
//! 2. [`ReadJob::run`] reads one frame.
//! 3. [`FramePump::finish_read`] takes the source back and hands out a
//!    [`TickJob`], or records end of stream / failure.
//! 4. [`TickJob::run`] detects, annotates and scales.
//! 5. [`FramePump::complete_tick`] publishes and reschedules.
//!
//! Selecting a source is split the same way: [`FramePump::begin_select`],
//! [`SelectJob::run`] (close the old source, open the new one) and
//! [`FramePump::complete_select`].
//!
//! Every select and reset bumps a generation counter. A read, tick or select
//! that finishes under an older generation is stale: its frame is discarded
//! and its source closed. A source that is out on a read when the pump is
//! reset is closed as soon as the read returns.
//!
//! The pump itself never sleeps. Whoever drives it (the runner thread, a UI
//! event loop, a test) calls `begin_tick` once `next_deadline` has passed.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::annotate::Annotator;
use crate::detect::SharedDetector;
use crate::display::{scale_to_fit, DisplayArea, DisplaySink};
use crate::error::{OpenError, PipelineError, ReadError};
use crate::frame::Frame;
use crate::ingest::{FrameSourceDescriptor, OpenFrameSource, ReadOutcome, SourceOpener};

type SharedOpener = Arc<Mutex<Box<dyn SourceOpener>>>;

/// Lifecycle of the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// No source selected.
    Idle,
    /// A source is open and ticks are being scheduled.
    Running,
    /// The source ended normally; the last frame stays on display.
    Exhausted,
    /// Opening or reading failed. Not retried.
    Failed(PipelineError),
}

impl PipelineState {
    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::Exhausted => write!(f, "exhausted"),
            PipelineState::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Counters since the pump was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub ticks_scheduled: u64,
    pub frames_read: u64,
    pub frames_published: u64,
    /// Frames that arrived after a reset or source switch.
    pub frames_discarded: u64,
    /// Detection calls that failed; their frames were shown without boxes.
    pub detector_errors: u64,
}

/// Where the active source currently is.
#[derive(Debug)]
enum SourceSlot {
    Empty,
    Held(OpenFrameSource),
    /// Out on a read; comes back through `finish_read`.
    Lent {
        descriptor: FrameSourceDescriptor,
        interval: Duration,
    },
}

/// A source lent out for one read.
pub struct ReadJob {
    generation: u64,
    source: OpenFrameSource,
}

impl ReadJob {
    /// Pull one frame. Blocks for as long as the source does.
    pub fn run(mut self) -> FrameRead {
        let outcome = self.source.read();
        FrameRead {
            generation: self.generation,
            source: self.source,
            outcome,
        }
    }
}

/// The result of a read, carrying the source back to the pump.
pub struct FrameRead {
    generation: u64,
    source: OpenFrameSource,
    outcome: Result<ReadOutcome, ReadError>,
}

/// The slow half of a tick, detached from the pump.
pub struct TickJob {
    generation: u64,
    frame: Frame,
    detector: SharedDetector,
    annotator: Arc<dyn Annotator>,
    area: Option<DisplayArea>,
}

impl TickJob {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Detect, annotate and scale. Blocks for as long as the detector does.
    pub fn run(self) -> CompletedTick {
        let sequence = self.frame.sequence();
        let detected = {
            let mut detector = self.detector.lock().unwrap_or_else(PoisonError::into_inner);
            detector.detect(&self.frame)
        };
        let (boxes, detector_failed) = match detected {
            Ok(boxes) => (boxes, false),
            Err(err) => {
                log::warn!(
                    "pump: detection failed on frame {}: {:#}; showing it without boxes",
                    sequence,
                    err
                );
                (Vec::new(), true)
            }
        };
        let annotated = self.annotator.annotate(self.frame, &boxes);
        let frame = match self.area {
            Some(area) => scale_to_fit(annotated, area),
            None => annotated,
        };
        CompletedTick {
            generation: self.generation,
            frame,
            boxes: boxes.len(),
            detector_failed,
        }
    }
}

/// A finished tick waiting to be published.
pub struct CompletedTick {
    generation: u64,
    frame: Frame,
    boxes: usize,
    detector_failed: bool,
}

impl CompletedTick {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn boxes(&self) -> usize {
        self.boxes
    }
}

/// Closes the previous source and opens the next one, away from the pump.
pub struct SelectJob {
    generation: u64,
    descriptor: FrameSourceDescriptor,
    previous: Option<OpenFrameSource>,
    opener: SharedOpener,
}

impl SelectJob {
    pub fn descriptor(&self) -> &FrameSourceDescriptor {
        &self.descriptor
    }

    /// Close the previous source, then open the new one. Blocks for as long
    /// as the backend takes to connect.
    pub fn run(mut self) -> OpenedSource {
        if let Some(mut previous) = self.previous.take() {
            previous.close();
        }
        log::info!("pump: opening {}", self.descriptor);
        let opened = {
            let mut opener = self.opener.lock().unwrap_or_else(PoisonError::into_inner);
            opener.open(&self.descriptor)
        }
        .map(|handle| OpenFrameSource::new(self.descriptor.clone(), handle));
        OpenedSource {
            generation: self.generation,
            descriptor: self.descriptor,
            opened,
        }
    }
}

/// Outcome of a [`SelectJob`].
pub struct OpenedSource {
    generation: u64,
    descriptor: FrameSourceDescriptor,
    opened: Result<OpenFrameSource, OpenError>,
}

pub struct FramePump {
    opener: SharedOpener,
    detector: SharedDetector,
    annotator: Arc<dyn Annotator>,
    sink: Box<dyn DisplaySink>,
    slot: SourceSlot,
    state: PipelineState,
    // Bumped by every select/reset; work from an older generation is stale.
    generation: u64,
    next_tick: Option<Instant>,
    in_flight: bool,
    reading: bool,
    stats: PumpStats,
}

impl FramePump {
    pub fn new(
        opener: Box<dyn SourceOpener>,
        detector: SharedDetector,
        annotator: Arc<dyn Annotator>,
        sink: Box<dyn DisplaySink>,
    ) -> Self {
        Self {
            opener: Arc::new(Mutex::new(opener)),
            detector,
            annotator,
            sink,
            slot: SourceSlot::Empty,
            state: PipelineState::Idle,
            generation: 0,
            next_tick: None,
            in_flight: false,
            reading: false,
            stats: PumpStats::default(),
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// The error behind `Failed`, for the UI to surface.
    pub fn last_error(&self) -> Option<&PipelineError> {
        match &self.state {
            PipelineState::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn active_descriptor(&self) -> Option<&FrameSourceDescriptor> {
        match &self.slot {
            SourceSlot::Empty => None,
            SourceSlot::Held(source) => Some(source.descriptor()),
            SourceSlot::Lent { descriptor, .. } => Some(descriptor),
        }
    }

    pub fn effective_interval(&self) -> Option<Duration> {
        match &self.slot {
            SourceSlot::Empty => None,
            SourceSlot::Held(source) => Some(source.effective_interval()),
            SourceSlot::Lent { interval, .. } => Some(*interval),
        }
    }

    /// When the next tick is due. `None` while idle, stopped, or mid-tick.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.in_flight {
            return None;
        }
        self.next_tick
    }

    pub fn is_tick_in_flight(&self) -> bool {
        self.in_flight
    }

    /// True while a source is out on a read that has not been finished.
    ///
    /// A read started before a reset or select still counts: its source is
    /// only closed once `finish_read` gets it back.
    pub fn is_reading(&self) -> bool {
        self.reading
    }

    /// Switch to a new source. Callable from any state.
    ///
    /// The previous source is closed before the new one is opened. On failure
    /// the pump enters `Failed` and schedules nothing.
    pub fn select_source(&mut self, descriptor: FrameSourceDescriptor) -> Result<(), OpenError> {
        let job = self.begin_select(descriptor);
        let opened = job.run();
        self.complete_select(opened)
    }

    /// Cancel the current tick and detach the current source for a switch.
    ///
    /// Callers that drive reads off the pump should wait until
    /// [`is_reading`](Self::is_reading) is false before running the job, so
    /// the old source is closed before the new one opens.
    pub fn begin_select(&mut self, descriptor: FrameSourceDescriptor) -> SelectJob {
        self.generation += 1;
        self.next_tick = None;
        let previous = self.detach();
        SelectJob {
            generation: self.generation,
            descriptor,
            previous,
            opener: Arc::clone(&self.opener),
        }
    }

    /// Install the source opened by a [`SelectJob`].
    ///
    /// A job superseded by a later select or reset closes what it opened and
    /// leaves the state alone.
    pub fn complete_select(&mut self, done: OpenedSource) -> Result<(), OpenError> {
        if done.generation != self.generation {
            log::debug!("pump: selection of {} was superseded", done.descriptor);
            return done.opened.map(|mut source| source.close());
        }
        match done.opened {
            Ok(source) => {
                let interval = source.effective_interval();
                log::info!(
                    "pump: {} open, ticking every {:?}",
                    source.descriptor(),
                    interval
                );
                self.slot = SourceSlot::Held(source);
                self.set_state(PipelineState::Running);
                self.schedule(interval);
                Ok(())
            }
            Err(err) => {
                self.set_state(PipelineState::Failed(PipelineError::Open(err.clone())));
                Err(err)
            }
        }
    }

    /// Stop, close the source, clear the display. Callable from any state.
    ///
    /// A source that is out on a read is closed when the read returns.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.next_tick = None;
        if let Some(mut source) = self.detach() {
            source.close();
        }
        self.sink.clear();
        self.set_state(PipelineState::Idle);
    }

    /// Lend the source out for the next read.
    ///
    /// Returns `None` when not running, when a tick is already in flight, or
    /// when no source is held.
    pub fn begin_tick(&mut self) -> Option<ReadJob> {
        if !self.state.is_running() || self.in_flight {
            return None;
        }
        let source = match mem::replace(&mut self.slot, SourceSlot::Empty) {
            SourceSlot::Held(source) => source,
            other => {
                self.slot = other;
                return None;
            }
        };
        self.next_tick = None;
        self.in_flight = true;
        self.reading = true;
        self.slot = SourceSlot::Lent {
            descriptor: source.descriptor().clone(),
            interval: source.effective_interval(),
        };
        Some(ReadJob {
            generation: self.generation,
            source,
        })
    }

    /// Take the source back from a read.
    ///
    /// Returns the detection half of the tick when a current frame arrived.
    /// End of stream and read errors close the source and change state. A
    /// read from before the last select or reset closes its source and drops
    /// the frame.
    pub fn finish_read(&mut self, read: FrameRead) -> Option<TickJob> {
        let FrameRead {
            generation,
            mut source,
            outcome,
        } = read;
        self.reading = false;

        if generation != self.generation || !self.state.is_running() {
            self.in_flight = false;
            source.close();
            if let Ok(ReadOutcome::Frame(frame)) = outcome {
                self.stats.frames_discarded += 1;
                log::debug!(
                    "pump: discarding frame {} read before a reset or switch",
                    frame.sequence()
                );
            }
            return None;
        }

        match outcome {
            Ok(ReadOutcome::Frame(frame)) => {
                self.stats.frames_read += 1;
                self.slot = SourceSlot::Held(source);
                Some(TickJob {
                    generation,
                    frame,
                    detector: Arc::clone(&self.detector),
                    annotator: Arc::clone(&self.annotator),
                    area: self.sink.area(),
                })
            }
            Ok(ReadOutcome::EndOfStream) => {
                log::info!("pump: {} reached end of stream", source.descriptor());
                self.in_flight = false;
                self.slot = SourceSlot::Empty;
                source.close();
                self.set_state(PipelineState::Exhausted);
                None
            }
            Err(err) => {
                self.in_flight = false;
                self.slot = SourceSlot::Empty;
                source.close();
                self.set_state(PipelineState::Failed(PipelineError::Read(err)));
                None
            }
        }
    }

    /// Publish a finished tick and schedule the next one.
    ///
    /// Returns `false` when the result is stale and was discarded.
    pub fn complete_tick(&mut self, done: CompletedTick) -> bool {
        self.in_flight = false;
        if done.detector_failed {
            self.stats.detector_errors += 1;
        }
        if done.generation != self.generation || !self.state.is_running() {
            self.stats.frames_discarded += 1;
            log::debug!(
                "pump: discarding frame {} from a superseded tick",
                done.frame.sequence()
            );
            return false;
        }

        log::debug!(
            "pump: showing frame {} with {} boxes, {:?} after capture",
            done.frame.sequence(),
            done.boxes,
            done.frame.age()
        );
        self.sink.publish(done.frame);
        self.stats.frames_published += 1;
        if let Some(interval) = self.effective_interval() {
            self.schedule(interval);
        }
        true
    }

    /// Run a whole tick inline. Returns `true` when a frame was published.
    pub fn tick(&mut self) -> bool {
        let Some(read) = self.begin_tick() else {
            return false;
        };
        let Some(job) = self.finish_read(read.run()) else {
            return false;
        };
        let done = job.run();
        self.complete_tick(done)
    }

    fn schedule(&mut self, interval: Duration) {
        self.next_tick = Some(Instant::now() + interval);
        self.stats.ticks_scheduled += 1;
    }

    /// Empty the slot, returning the source if the pump holds it.
    fn detach(&mut self) -> Option<OpenFrameSource> {
        match mem::replace(&mut self.slot, SourceSlot::Empty) {
            SourceSlot::Held(source) => Some(source),
            SourceSlot::Lent { .. } | SourceSlot::Empty => None,
        }
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state == state {
            return;
        }
        match &state {
            PipelineState::Failed(err) => log::error!("pump: {} -> failed: {}", self.state, err),
            next => log::info!("pump: {} -> {}", self.state, next),
        }
        if !state.is_running() {
            self.next_tick = None;
        }
        self.state = state;
    }
}

impl fmt::Debug for FramePump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePump")
            .field("state", &self.state)
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .field("next_tick", &self.next_tick)
            .field("in_flight", &self.in_flight)
            .field("reading", &self.reading)
            .field("stats", &self.stats)
            .finish()
    }
}
