//! Periodic sampling of a getter into a columnar store.
//!
//! A [`Recorder`] owns a [`SeriesStore`](crate::series::SeriesStore) declared
//! with a fixed field set and drives a background thread that calls a
//! [`Getter`] at a fixed rate, stamping each row with the current time.
//!
//! # Lifecycle
//!
//! ```text
//!            start()                       stop() / cutoff passed
//!   Idle  ------------->  Running  ---------------------------------> Idle
//!    ^                      |  ^                                       |
//!    |                      +--+  start() while running: no-op         |
//!    +-----------------------------------------------------------------+
//! ```
//!
//! - `start` anchors a [`Schedule`] at the current instant and spawns the
//!   sampling thread. Sample `k` is due at `anchor + k / rate`.
//! - `stop` cancels the thread and joins it. Once it returns, no further
//!   rows are appended until the next `start`.
//! - When a bounded run's window passes, the thread exits on its own and
//!   [`Recorder::is_recording`] turns false. The finished thread is joined
//!   at the next `start`, `stop`, `wait`, or when the recorder is dropped.
//!
//! # Failures in the background
//!
//! A sample that fails (the getter returns an error, or its row lacks a
//! declared field) aborts the loop. Nothing is appended for the failed row.
//! The error is logged and then returned by the next `stop`, `wait` or
//! `start`; after that the recorder is idle and can be started again.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use metronome::{Recorder, Row, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = Recorder::with_getter(&["power", "voltage"], || {
//!     Ok(Row::from([
//!         ("power".to_string(), Value::from(12.5)),
//!         ("voltage".to_string(), Value::from(230.1)),
//!     ]))
//! })?;
//!
//! // Ten samples per second for two seconds
//! recorder.start(10.0, Some(Duration::from_secs(2)))?;
//! recorder.wait()?;
//!
//! println!("{recorder}");
//! recorder.save("power.json")?;
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::fmt;
use std::ops::RangeBounds;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::error::{BoxError, RecorderError, Result};
use crate::persist;
use crate::plot::{self, Curve};
use crate::schedule::{Clock, SamplingConfig, Schedule};
use crate::series::{LiveSeries, RawSeries, Row, SeriesStore};
use crate::value::Value;

/// Name given to the background sampling thread.
const WORKER_THREAD_NAME: &str = "metronome-sampler";

/// What a [`Getter`] returns for one sample.
pub type GetterResult = std::result::Result<Row, BoxError>;

/// Produces one row of field values on demand.
///
/// Closures are passed straight to [`Recorder::set_getter`]. Implement this
/// trait for a stateful source and install it with
/// [`Recorder::set_boxed_getter`].
pub trait Getter: Send + 'static {
    /// Reads the current value of every field.
    ///
    /// # Errors
    ///
    /// Any error aborts a running sampling loop.
    fn sample(&mut self) -> GetterResult;
}

impl<F> Getter for F
where
    F: FnMut() -> GetterResult + Send + 'static,
{
    fn sample(&mut self) -> GetterResult {
        self()
    }
}

type SharedGetter = Arc<Mutex<Option<Box<dyn Getter>>>>;

/// Why a sampling loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// The recorder cancelled it.
    Cancelled,
    /// The recording window passed.
    Elapsed,
}

/// State shared by the caller's thread and the sampling thread.
#[derive(Clone)]
struct Sampler {
    series: LiveSeries,
    getter: SharedGetter,
    clock: Clock,
}

impl Sampler {
    /// Takes one sample and appends it.
    ///
    /// Non-empty explicit data wins over the getter. Without either, the row
    /// is empty and only `time` is filled in.
    fn sample(&self, explicit: Option<Row>) -> Result<()> {
        let row = match explicit.filter(|row| !row.is_empty()) {
            Some(row) => row,
            None => match self.getter.lock().as_mut() {
                Some(getter) => getter
                    .sample()
                    .map_err(|source| RecorderError::Getter { source })?,
                None => Row::new(),
            },
        };

        self.series.append_stamped(row, &self.clock)
    }
}

/// A running sampling thread.
struct Worker {
    /// Dropping the sender wakes and cancels the thread.
    cancel: Sender<()>,
    handle: JoinHandle<Result<LoopExit>>,
    schedule: Arc<Mutex<Schedule>>,
    config: SamplingConfig,
}

/// Samples a getter at a fixed rate into a columnar store.
///
/// See the [module documentation](self) for the lifecycle and failure
/// semantics.
pub struct Recorder {
    sampler: Sampler,
    worker: Option<Worker>,
    /// A cancelled thread that has not been joined yet.
    ///
    /// `start` always reaps it before spawning, so at most one is parked.
    parked: Option<JoinHandle<Result<LoopExit>>>,
}

impl Recorder {
    /// Creates an idle recorder with no getter.
    ///
    /// The store is declared with `time` followed by `fields`.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`](crate::error::FieldError) if `fields`
    /// contains `time` or a duplicate.
    pub fn new<S: AsRef<str>>(fields: &[S]) -> Result<Self> {
        let store = SeriesStore::new(fields)?;
        Ok(Self {
            sampler: Sampler {
                series: LiveSeries::new(store),
                getter: Arc::new(Mutex::new(None)),
                clock: Clock::new(),
            },
            worker: None,
            parked: None,
        })
    }

    /// Creates an idle recorder bound to `getter`.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`](crate::error::FieldError) if `fields`
    /// contains `time` or a duplicate.
    pub fn with_getter<S, F>(fields: &[S], getter: F) -> Result<Self>
    where
        S: AsRef<str>,
        F: FnMut() -> GetterResult + Send + 'static,
    {
        let mut recorder = Self::new(fields)?;
        recorder.set_getter(getter);
        Ok(recorder)
    }

    /// Replaces the getter used by future samples, including the next sample
    /// of a running loop.
    pub fn set_getter<F>(&mut self, getter: F)
    where
        F: FnMut() -> GetterResult + Send + 'static,
    {
        self.set_boxed_getter(Box::new(getter));
    }

    /// Like [`Recorder::set_getter`], for types implementing [`Getter`]
    /// directly.
    pub fn set_boxed_getter(&mut self, getter: Box<dyn Getter>) {
        *self.sampler.getter.lock() = Some(getter);
    }

    /// Removes the getter. A running loop keeps going with empty rows and
    /// fails on its next sample unless the field set is empty.
    pub fn clear_getter(&mut self) {
        *self.sampler.getter.lock() = None;
    }

    /// Returns true if a getter is installed.
    pub fn has_getter(&self) -> bool {
        self.sampler.getter.lock().is_some()
    }

    /// Takes one sample now and appends it.
    ///
    /// Non-empty `explicit` data is used as-is; otherwise the getter is
    /// called. `time` is always set to the current time, replacing any
    /// caller-supplied value. Safe to call while recording.
    ///
    /// # Errors
    ///
    /// - [`FieldError::MissingField`](crate::error::FieldError::MissingField)
    ///   if the row lacks a declared field; nothing is appended
    /// - [`RecorderError::Getter`] if the getter fails
    pub fn sample(&self, explicit: Option<Row>) -> Result<()> {
        self.sampler.sample(explicit)
    }

    /// Starts sampling at `rate_hz` for `duration`, or until stopped.
    ///
    /// Does nothing if already recording.
    ///
    /// # Errors
    ///
    /// See [`Recorder::start_with`].
    pub fn start(&mut self, rate_hz: f64, duration: Option<Duration>) -> Result<()> {
        self.start_with(SamplingConfig { rate_hz, duration })
    }

    /// Starts sampling with `config`.
    ///
    /// Does nothing if already recording. Otherwise joins any finished or
    /// cancelled sampling thread first and spawns a new one whose first
    /// sample is due immediately.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::InvalidRate`] if the rate is not positive
    /// - the failure of the previous run, if it ended in an error; the
    ///   recorder is then idle and a second `start` proceeds
    /// - [`RecorderError::NoGetter`] if no getter is installed
    /// - [`RecorderError::Spawn`] if the thread cannot be created
    pub fn start_with(&mut self, config: SamplingConfig) -> Result<()> {
        config.validate()?;

        if self.is_recording() {
            tracing::debug!("start ignored: already recording");
            return Ok(());
        }

        self.reap()?;

        if !self.has_getter() {
            return Err(RecorderError::NoGetter.into());
        }

        let schedule = Arc::new(Mutex::new(Schedule::new(Instant::now(), &config)));
        let (cancel, cancelled) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn({
                let sampler = self.sampler.clone();
                let schedule = Arc::clone(&schedule);
                move || run_loop(&sampler, &schedule, &cancelled)
            })
            .map_err(|source| RecorderError::Spawn { source })?;

        match config.duration {
            Some(duration) => tracing::info!(
                "recording started: {} Hz for {:.3}s",
                config.rate_hz,
                duration.as_secs_f64()
            ),
            None => tracing::info!("recording started: {} Hz until stopped", config.rate_hz),
        }

        self.worker = Some(Worker {
            cancel,
            handle,
            schedule,
            config,
        });
        Ok(())
    }

    /// Stops recording and waits for the sampling thread to exit.
    ///
    /// Once this returns no further rows are appended. Does nothing if idle.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the sampling loop, if any.
    pub fn stop(&mut self) -> Result<()> {
        let was_recording = self.is_recording();
        let outcome = self.reap();
        if was_recording {
            tracing::info!("recording stopped after {} row(s)", self.len());
        }
        outcome
    }

    /// Asks the sampling thread to stop without waiting for it.
    ///
    /// The recorder is idle when this returns, but a sample already in
    /// progress may still be appended. The thread is joined, and any error
    /// it hit is returned, by the next `start`, `stop` or `wait`.
    pub fn request_stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.cancel);
            self.parked = Some(worker.handle);
            tracing::debug!("stop requested");
        }
    }

    /// Blocks until the sampling loop ends on its own.
    ///
    /// Intended for bounded runs. An unbounded run only ends on a sampling
    /// error, so waiting on one may block forever. Returns at once when idle.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the sampling loop, if any.
    pub fn wait(&mut self) -> Result<()> {
        let parked = self.parked.take().map(join_worker);

        let running = self.worker.take().map(|worker| {
            // Keep the sender alive until the join so the loop is not cancelled.
            let Worker { cancel, handle, .. } = worker;
            let outcome = join_worker(handle);
            drop(cancel);
            outcome
        });

        for outcome in [parked, running].into_iter().flatten() {
            outcome?;
        }
        Ok(())
    }

    /// Returns true while a sampling thread is running.
    pub fn is_recording(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Returns the configuration of the current run.
    pub fn config(&self) -> Option<SamplingConfig> {
        self.active().map(|worker| worker.config)
    }

    /// Returns when the next sample of the current run is due.
    ///
    /// `None` when idle, or when the rate is so low that the next sample
    /// lies beyond any representable instant.
    pub fn next_sample_at(&self) -> Option<Instant> {
        self.active()
            .and_then(|worker| worker.schedule.lock().next_due())
    }

    /// Returns the end of the current run's window, if bounded.
    pub fn cutoff(&self) -> Option<Instant> {
        self.active().and_then(|worker| worker.schedule.lock().cutoff())
    }

    /// Returns the number of samples the current run has taken.
    pub fn samples_taken(&self) -> Option<u64> {
        self.active().map(|worker| worker.schedule.lock().ticks())
    }

    /// Returns a read-only handle to the store that can be sent to other
    /// threads, for example a live plot.
    pub fn series(&self) -> LiveSeries {
        self.sampler.series.clone()
    }

    /// Returns the field names, `time` first.
    pub fn fields(&self) -> Vec<String> {
        self.sampler.series.fields()
    }

    /// Returns the number of rows recorded.
    pub fn len(&self) -> usize {
        self.sampler.series.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.sampler.series.is_empty()
    }

    /// Returns the timestamp of the newest row.
    pub fn latest_time(&self) -> Option<f64> {
        self.sampler.series.latest_time()
    }

    /// Returns every value recorded for `field`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::UnknownField`](crate::error::FieldError::UnknownField)
    /// if `field` was never declared.
    pub fn get(&self, field: &str) -> Result<Vec<Value>> {
        self.sampler.series.get(field)
    }

    /// Returns the row at `index`; negative indices count from the end.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::RowOutOfRange`](crate::error::IndexError::RowOutOfRange)
    /// if no such row exists.
    pub fn row(&self, index: isize) -> Result<Row> {
        self.sampler.series.row(index)
    }

    /// Returns every column restricted to `range`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::SliceOutOfRange`](crate::error::IndexError::SliceOutOfRange)
    /// if the range does not fit.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Result<RawSeries> {
        self.sampler.series.slice(range)
    }

    /// Returns one curve per non-time field against elapsed seconds.
    pub fn curves(&self) -> Vec<Curve> {
        plot::curves(&self.sampler.series.snapshot())
    }

    /// Returns one curve per requested field against elapsed seconds.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::UnknownField`](crate::error::FieldError::UnknownField)
    /// if a requested field was never declared.
    pub fn curves_for<S: AsRef<str>>(&self, fields: &[S]) -> Result<Vec<Curve>> {
        plot::curves_for(&self.sampler.series.snapshot(), fields)
    }

    /// Writes the recorded series to `path` as JSON.
    ///
    /// Safe while recording: the rows written are a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistError`](crate::error::PersistError) naming `path`
    /// if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let raw = self.sampler.series.to_raw();
        persist::write_raw(path.as_ref(), &raw)?;
        tracing::debug!("saved {} row(s) to {}", self.len(), path.as_ref().display());
        Ok(())
    }

    /// Replaces the recorded series with the contents of `path`.
    ///
    /// The field set becomes the file's field set; the caller is responsible
    /// for loading a file recorded with the same fields as the getter.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::Recording`] if called while recording
    /// - the failure of a previous run that has not been reported yet
    /// - a [`PersistError`](crate::error::PersistError) if the file cannot
    ///   be read or parsed
    /// - a [`SeriesError`](crate::error::SeriesError) if its columns differ
    ///   in length or repeat
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.is_recording() {
            return Err(RecorderError::Recording { operation: "load" }.into());
        }
        self.reap()?;

        let raw = persist::read_raw(path.as_ref())?;
        self.sampler.series.replace(raw)?;
        tracing::debug!("loaded {} row(s) from {}", self.len(), path.as_ref().display());
        Ok(())
    }

    /// Returns the worker of a run that is still going.
    fn active(&self) -> Option<&Worker> {
        self.worker
            .as_ref()
            .filter(|worker| !worker.handle.is_finished())
    }

    /// Cancels and joins every sampling thread this recorder owns.
    ///
    /// All threads are joined even if one of them failed; the first failure
    /// is returned.
    fn reap(&mut self) -> Result<()> {
        let parked = self.parked.take().map(join_worker);

        let current = self.worker.take().map(|worker| {
            drop(worker.cancel);
            join_worker(worker.handle)
        });

        for outcome in [parked, current].into_iter().flatten() {
            outcome?;
        }
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.reap() {
            tracing::warn!("sampling loop failed before the recorder was dropped: {e}");
        }
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("fields", &self.fields())
            .field("len", &self.len())
            .field("recording", &self.is_recording())
            .field("config", &self.config())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Recorder {
    /// Formats as `Recorder(<rows>) time,field,...`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Recorder({}) {}", self.len(), self.fields().join(","))
    }
}

/// Body of the sampling thread.
fn run_loop(
    sampler: &Sampler,
    schedule: &Mutex<Schedule>,
    cancelled: &Receiver<()>,
) -> Result<LoopExit> {
    loop {
        // Sleep until the next sample is due, the window closes, or we are cancelled.
        loop {
            let now = Instant::now();
            let (due, past_cutoff, wake_at) = {
                let schedule = schedule.lock();
                (
                    schedule.is_due(now),
                    schedule.is_past_cutoff(now),
                    schedule.wake_at(),
                )
            };

            if due {
                break;
            }
            if past_cutoff {
                return Ok(elapsed(schedule));
            }

            let woken = match wake_at {
                Some(deadline) => cancelled.recv_deadline(deadline),
                None => cancelled
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match woken {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(LoopExit::Cancelled),
            }
        }

        if !matches!(cancelled.try_recv(), Err(TryRecvError::Empty)) {
            return Ok(LoopExit::Cancelled);
        }

        if let Err(e) = sampler.sample(None) {
            tracing::warn!("sampling loop aborted: {e}");
            return Err(e);
        }

        // Anchored cadence: the next due time does not depend on when this
        // sample actually ran.
        let finished = {
            let mut schedule = schedule.lock();
            schedule.advance();
            schedule.is_exhausted() || schedule.is_past_cutoff(Instant::now())
        };

        // A loop running behind must still stop once the window has closed.
        if finished {
            return Ok(elapsed(schedule));
        }
    }
}

fn elapsed(schedule: &Mutex<Schedule>) -> LoopExit {
    tracing::info!(
        "recording window elapsed after {} sample(s)",
        schedule.lock().ticks()
    );
    LoopExit::Elapsed
}

/// Joins a sampling thread, turning a panic into an error.
fn join_worker(handle: JoinHandle<Result<LoopExit>>) -> Result<LoopExit> {
    handle.join().unwrap_or_else(|payload| {
        Err(RecorderError::WorkerPanicked {
            message: panic_message(payload.as_ref()),
        }
        .into())
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
