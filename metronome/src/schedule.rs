//! Sampling cadence: configuration, schedule arithmetic, and timestamps.
//!
//! The schedule is anchored at the instant recording starts. The `k`-th
//! sample is due at `anchor + k / rate`, computed from the tick counter
//! rather than from the time the previous sample actually happened. A late
//! sample therefore does not shift the phase of every sample after it: the
//! loop simply finds the next sample already due and catches up.
//!
//! Nothing in this module touches threads or the clock on its own, so the
//! arithmetic can be tested with synthetic instants.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{RecorderError, Result};

/// How fast to sample and for how long.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use metronome::SamplingConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Ten samples per second for two seconds
/// let config = SamplingConfig::new(10.0, Some(Duration::from_secs(2)))?;
/// assert_eq!(config.period(), Duration::from_millis(100));
///
/// // Rates must be positive
/// assert!(SamplingConfig::new(0.0, None).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Target samples per second.
    pub rate_hz: f64,

    /// Total recording time, or `None` to record until stopped.
    ///
    /// Serialized as fractional seconds.
    #[serde(default, with = "optional_duration_secs")]
    pub duration: Option<Duration>,
}

impl SamplingConfig {
    /// Creates and validates a sampling configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::InvalidRate`] if `rate_hz` is not a positive
    /// finite number with a representable period.
    pub fn new(rate_hz: f64, duration: Option<Duration>) -> Result<Self> {
        let config = Self { rate_hz, duration };
        config.validate()?;
        Ok(config)
    }

    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::InvalidRate`] if validation fails.
    pub fn validate(&self) -> Result<()> {
        if !self.rate_hz.is_finite()
            || self.rate_hz <= 0.0
            || Duration::try_from_secs_f64(self.rate_hz.recip()).is_err()
        {
            return Err(RecorderError::InvalidRate { rate: self.rate_hz }.into());
        }
        Ok(())
    }

    /// Returns the nominal time between samples.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }
}

impl Default for SamplingConfig {
    /// One sample per second, no time limit.
    fn default() -> Self {
        Self {
            rate_hz: 1.0,
            duration: None,
        }
    }
}

/// Drift-correcting sample schedule for one recording run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    /// When the run started; sample `k` is due at `anchor + k / rate`.
    anchor: Instant,
    /// Samples per second.
    rate_hz: f64,
    /// Samples taken so far.
    ticks: u64,
    /// No sample is started once this instant has passed.
    cutoff: Option<Instant>,
}

impl Schedule {
    /// Creates a schedule whose first sample is due at `anchor`.
    pub fn new(anchor: Instant, config: &SamplingConfig) -> Self {
        Self {
            anchor,
            rate_hz: config.rate_hz,
            ticks: 0,
            // A window too long to represent is treated as unbounded.
            cutoff: config.duration.and_then(|d| anchor.checked_add(d)),
        }
    }

    /// Returns the instant the schedule was anchored at.
    pub fn anchor(&self) -> Instant {
        self.anchor
    }

    /// Returns the number of samples taken so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns the end of the recording window, if bounded.
    pub fn cutoff(&self) -> Option<Instant> {
        self.cutoff
    }

    /// Returns when the next sample is due.
    ///
    /// `None` if that instant is too far in the future to represent, which
    /// only happens at extremely low rates; such a sample is never due.
    #[allow(clippy::cast_precision_loss)] // tick counts stay far below 2^53
    pub fn next_due(&self) -> Option<Instant> {
        let offset = Duration::try_from_secs_f64(self.ticks as f64 / self.rate_hz).ok()?;
        self.anchor.checked_add(offset)
    }

    /// Returns true if the next sample is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due().is_some_and(|due| now >= due)
    }

    /// Returns true if `now` is strictly past the cutoff.
    pub fn is_past_cutoff(&self, now: Instant) -> bool {
        self.cutoff.is_some_and(|cutoff| now > cutoff)
    }

    /// Returns true once the next sample falls after the cutoff.
    ///
    /// An unbounded schedule is never exhausted.
    pub fn is_exhausted(&self) -> bool {
        match (self.cutoff, self.next_due()) {
            (Some(cutoff), Some(due)) => due > cutoff,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Returns the instant a waiting loop must wake by: the next due time or
    /// the cutoff, whichever comes first.
    ///
    /// `None` means there is nothing to wake for.
    pub fn wake_at(&self) -> Option<Instant> {
        match (self.next_due(), self.cutoff) {
            (Some(due), Some(cutoff)) => Some(due.min(cutoff)),
            (due, cutoff) => due.or(cutoff),
        }
    }

    /// Marks the current sample as taken.
    pub fn advance(&mut self) {
        self.ticks += 1;
    }
}

/// Wall-clock seconds that never run backwards.
///
/// Reads the system clock once and then advances it with a monotonic
/// [`Instant`], so stepping the system clock mid-recording cannot produce a
/// `time` column that decreases.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall_origin: f64,
    mono_origin: Instant,
}

impl Clock {
    /// Creates a clock starting at the current system time.
    pub fn new() -> Self {
        let wall_origin = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self {
            wall_origin,
            mono_origin: Instant::now(),
        }
    }

    /// Returns the current time in seconds since the Unix epoch.
    pub fn now(&self) -> f64 {
        self.at(Instant::now())
    }

    /// Converts an instant into seconds since the Unix epoch.
    pub fn at(&self, instant: Instant) -> f64 {
        self.wall_origin + instant.saturating_duration_since(self.mono_origin).as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

mod optional_duration_secs {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|seconds| Duration::try_from_secs_f64(seconds).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetronomeError;

    fn config(rate_hz: f64, duration: Option<Duration>) -> SamplingConfig {
        SamplingConfig::new(rate_hz, duration).unwrap()
    }

    #[test]
    fn test_rate_validation() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e-300] {
            let err = SamplingConfig::new(bad, None).unwrap_err();
            assert!(
                matches!(err, MetronomeError::Recorder(RecorderError::InvalidRate { .. })),
                "rate {bad} should be rejected"
            );
        }
        assert!(SamplingConfig::new(0.5, None).is_ok());
    }

    #[test]
    fn test_period() {
        assert_eq!(config(4.0, None).period(), Duration::from_millis(250));
        assert_eq!(config(0.5, None).period(), Duration::from_secs(2));
    }

    #[test]
    fn test_config_serde() {
        let parsed: SamplingConfig =
            serde_json::from_str(r#"{"rate_hz": 10.0, "duration": 0.25}"#).unwrap();
        assert_eq!(parsed, config(10.0, Some(Duration::from_millis(250))));

        let unbounded: SamplingConfig = serde_json::from_str(r#"{"rate_hz": 2.0}"#).unwrap();
        assert_eq!(unbounded.duration, None);

        let json = serde_json::to_string(&config(5.0, Some(Duration::from_secs(3)))).unwrap();
        assert_eq!(json, r#"{"rate_hz":5.0,"duration":3.0}"#);

        assert!(serde_json::from_str::<SamplingConfig>(r#"{"rate_hz": 1.0, "duration": -1.0}"#).is_err());
    }

    #[test]
    fn test_first_sample_due_at_anchor() {
        let anchor = Instant::now();
        let schedule = Schedule::new(anchor, &config(10.0, None));

        assert_eq!(schedule.next_due(), Some(anchor));
        assert!(schedule.is_due(anchor));
        assert_eq!(schedule.ticks(), 0);
    }

    #[test]
    fn test_next_due_is_anchored_not_relative() {
        let anchor = Instant::now();
        let mut schedule = Schedule::new(anchor, &config(10.0, None));

        // Sample 0 runs 250ms late; samples 1 and 2 are already due then.
        let late = anchor + Duration::from_millis(250);
        let mut taken = 0;
        while schedule.is_due(late) {
            schedule.advance();
            taken += 1;
        }
        assert_eq!(taken, 3);

        // Sample 3 stays on the original grid, not at late + 100ms.
        assert_eq!(schedule.next_due(), Some(anchor + Duration::from_millis(300)));
        assert!(!schedule.is_due(late));
    }

    #[test]
    fn test_many_ticks_do_not_accumulate_error() {
        let anchor = Instant::now();
        let mut schedule = Schedule::new(anchor, &config(3.0, None));
        for _ in 0..3000 {
            schedule.advance();
        }
        let expected = anchor + Duration::from_secs(1000);
        let due = schedule.next_due().unwrap();
        let drift = if due > expected {
            due - expected
        } else {
            expected - due
        };
        assert!(drift < Duration::from_micros(1), "drift was {drift:?}");
    }

    #[test]
    fn test_cutoff() {
        let anchor = Instant::now();
        let bounded = Schedule::new(anchor, &config(5.0, Some(Duration::from_millis(200))));

        assert_eq!(bounded.cutoff(), Some(anchor + Duration::from_millis(200)));
        assert!(!bounded.is_past_cutoff(anchor + Duration::from_millis(200)));
        assert!(bounded.is_past_cutoff(anchor + Duration::from_millis(201)));

        let unbounded = Schedule::new(anchor, &config(5.0, None));
        assert!(!unbounded.is_past_cutoff(anchor + Duration::from_secs(86_400)));
    }

    #[test]
    fn test_wake_at_prefers_earlier_deadline() {
        let anchor = Instant::now();
        let mut schedule = Schedule::new(anchor, &config(1.0, Some(Duration::from_millis(300))));
        schedule.advance();

        // Next sample at +1s, cutoff at +300ms.
        assert_eq!(schedule.wake_at(), Some(anchor + Duration::from_millis(300)));

        let mut open = Schedule::new(anchor, &config(1.0, None));
        open.advance();
        assert_eq!(open.wake_at(), Some(anchor + Duration::from_secs(1)));
    }

    #[test]
    fn test_exhausted_once_next_sample_leaves_window() {
        let anchor = Instant::now();
        let mut schedule = Schedule::new(anchor, &config(5.0, Some(Duration::from_millis(200))));

        // Samples at 0 and 200ms fit; the one at 400ms does not.
        assert!(!schedule.is_exhausted());
        schedule.advance();
        assert!(!schedule.is_exhausted());
        schedule.advance();
        assert!(schedule.is_exhausted());

        let mut open = Schedule::new(anchor, &config(5.0, None));
        for _ in 0..100 {
            open.advance();
        }
        assert!(!open.is_exhausted());
    }

    #[test]
    fn test_unrepresentable_due_time_is_never_due() {
        let anchor = Instant::now();
        let mut schedule = Schedule::new(anchor, &config(1e-19, None));
        assert_eq!(schedule.next_due(), Some(anchor));

        schedule.advance();
        schedule.advance();
        assert_eq!(schedule.next_due(), None);
        assert!(!schedule.is_due(anchor + Duration::from_secs(86_400)));
        assert_eq!(schedule.wake_at(), None);
        assert!(!schedule.is_exhausted());

        let mut bounded = Schedule::new(anchor, &config(1e-19, Some(Duration::from_secs(1))));
        bounded.advance();
        bounded.advance();
        assert_eq!(bounded.wake_at(), bounded.cutoff());
        assert!(bounded.is_exhausted());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = Clock::new();
        let start = Instant::now();
        let a = clock.at(start);
        let b = clock.at(start + Duration::from_millis(1500));
        assert!((b - a - 1.5).abs() < 1e-5);
        assert!(clock.now() >= a);
        assert!(a > 1_600_000_000.0);
    }
}
