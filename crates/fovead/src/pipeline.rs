//! Periodic capture → convert → publish scheduler.
//!
//! Single-threaded and cooperative: one tick fully completes before the
//! next is considered, so ticks never overlap. Tick execution is decoupled
//! from timing (`Pipeline::run_tick`) so the cycle can be driven directly
//! in tests.

use crate::egress::{Egress, EgressError, ImageRecord};
use fovea_hw::{convert, FrameSource, ResizeBuffer};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// What the scheduler does after a failed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Skip the tick and keep running.
    Skip,
    /// Skip, but stop the pipeline after this many consecutive failures.
    StopAfter(u32),
}

/// Scheduler lifecycle. Stopped is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Running = 1,
    Stopped = 2,
}

impl PipelineState {
    fn from_u8(v: u8) -> PipelineState {
        match v {
            0 => PipelineState::Idle,
            1 => PipelineState::Running,
            _ => PipelineState::Stopped,
        }
    }
}

/// Outcome of a single tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// A frame was converted and published.
    Published,
    /// No frame was ready; nothing happened.
    Empty,
    /// The tick failed and was skipped per policy.
    Skipped,
    /// The pipeline must stop: failure threshold reached, egress gone, or a
    /// defect-class error surfaced.
    Stop,
}

/// One capture → convert → publish unit.
pub struct Pipeline<S, E> {
    source: S,
    egress: E,
    buffer: ResizeBuffer,
    failure_policy: FailurePolicy,
    consecutive_failures: u32,
}

impl<S: FrameSource, E: Egress> Pipeline<S, E> {
    pub fn new(source: S, egress: E, buffer: ResizeBuffer, failure_policy: FailurePolicy) -> Self {
        Self {
            source,
            egress,
            buffer,
            failure_policy,
            consecutive_failures: 0,
        }
    }

    /// Execute one tick. The frame lives only within this call; nothing is
    /// retained across ticks except the fixed destination buffer.
    pub fn run_tick(&mut self) -> TickOutcome {
        let frame = match self.source.acquire() {
            Ok(Some(frame)) => frame,
            // An empty tick is not a failure; wait for the next one.
            Ok(None) => return TickOutcome::Empty,
            Err(e) => {
                tracing::warn!(error = %e, "frame acquisition failed");
                return self.tick_failed();
            }
        };

        if let Err(e) = convert(&frame, &mut self.buffer) {
            tracing::warn!(
                error = %e,
                frame_width = frame.width,
                frame_height = frame.height,
                "conversion failed, skipping tick"
            );
            return self.tick_failed();
        }

        let geometry = self.buffer.geometry();
        let record = match ImageRecord::from_pixels(
            geometry.width,
            geometry.height,
            self.buffer.stride(),
            self.buffer.format(),
            self.buffer.as_slice(),
        ) {
            Ok(record) => record,
            Err(e) => {
                // The fixed working format always has a wire mapping; this
                // path is a defect, reported and fatal, never a silent drop.
                tracing::error!(error = %e, "unpublishable record, stopping pipeline");
                return TickOutcome::Stop;
            }
        };

        match self.egress.publish(record) {
            Ok(()) => {
                self.consecutive_failures = 0;
                TickOutcome::Published
            }
            Err(EgressError::Closed) => {
                tracing::info!("egress closed, stopping pipeline");
                TickOutcome::Stop
            }
            Err(e) => {
                tracing::warn!(error = %e, "publish failed");
                self.tick_failed()
            }
        }
    }

    fn tick_failed(&mut self) -> TickOutcome {
        self.consecutive_failures += 1;
        match self.failure_policy {
            FailurePolicy::Skip => TickOutcome::Skipped,
            FailurePolicy::StopAfter(limit) if self.consecutive_failures >= limit => {
                tracing::error!(
                    failures = self.consecutive_failures,
                    "consecutive failure threshold reached, stopping pipeline"
                );
                TickOutcome::Stop
            }
            FailurePolicy::StopAfter(_) => TickOutcome::Skipped,
        }
    }
}

/// Handle to a running pipeline thread.
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    join: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Request shutdown and wait for the tick thread to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Arm the timer and start ticking at the fixed period.
///
/// Drop policy: if a tick overruns its period, the schedule is re-anchored
/// to now and the missed ticks are dropped — late work is never allowed to
/// pile up behind the deadline.
pub fn spawn_pipeline<S, E>(
    pipeline: Pipeline<S, E>,
    period: Duration,
) -> std::io::Result<PipelineHandle>
where
    S: FrameSource + Send + 'static,
    E: Egress + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let state = Arc::new(AtomicU8::new(PipelineState::Idle as u8));

    let thread_stop = stop.clone();
    let thread_state = state.clone();
    let join = std::thread::Builder::new()
        .name("fovea-pipeline".into())
        .spawn(move || {
            let mut pipeline = pipeline;
            thread_state.store(PipelineState::Running as u8, Ordering::SeqCst);
            tracing::info!(period_ms = period.as_millis() as u64, "pipeline running");

            let mut next = Instant::now() + period;
            while !thread_stop.load(Ordering::SeqCst) {
                if matches!(pipeline.run_tick(), TickOutcome::Stop) {
                    break;
                }

                let now = Instant::now();
                if now < next {
                    std::thread::sleep(next - now);
                    next += period;
                } else {
                    next = now + period;
                }
            }

            thread_state.store(PipelineState::Stopped as u8, Ordering::SeqCst);
            tracing::info!("pipeline stopped");
        })?;

    Ok(PipelineHandle {
        stop,
        state,
        join: Some(join),
    })
}
