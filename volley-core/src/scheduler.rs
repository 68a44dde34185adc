//! Arrival scheduling
//!
//! Converts a [`Schedule`] into a lazy, finite sequence of arrival events.
//! Time is discretized into fixed ticks. For each tick the number of
//! arrivals owed is `rate(midpoint) * tick`, rounded to an integer with the
//! fractional part carried into the next tick so the running total never
//! drifts by more than half an arrival. The arrivals of a tick are spread
//! evenly across it.

use crate::schedule::Schedule;
use std::time::Duration;

/// Default scheduling resolution
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

const MIN_TICK: Duration = Duration::from_millis(1);

/// A single arrival, relative to the start of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalEvent {
    pub scheduled_at: Duration,
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct ArrivalScheduler {
    schedule: Schedule,
    tick: Duration,
}

impl ArrivalScheduler {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            tick: DEFAULT_TICK,
        }
    }

    /// Override the tick length (clamped to at least 1ms)
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(MIN_TICK);
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// End of the arrival phase
    pub fn horizon(&self) -> Duration {
        self.schedule.total_duration()
    }

    /// Instantaneous rate (arrivals/s) at `elapsed` into the run
    ///
    /// Linear interpolation inside the active stage; the last target rate is
    /// held once all stages are over.
    pub fn rate_at(&self, elapsed: Duration) -> f64 {
        let mut stage_start = Duration::ZERO;
        let mut previous = self.schedule.start_rate();

        for stage in self.schedule.stages() {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return previous + (stage.target_rate - previous) * progress;
            }
            stage_start = stage_end;
            previous = stage.target_rate;
        }

        previous
    }

    /// Consume the scheduler into its event stream
    pub fn events(self) -> ArrivalEvents {
        let horizon = self.horizon();
        ArrivalEvents {
            scheduler: self,
            horizon,
            next_tick: Duration::ZERO,
            carry: 0.0,
            batch: Batch::default(),
            sequence: 0,
        }
    }
}

impl IntoIterator for ArrivalScheduler {
    type Item = ArrivalEvent;
    type IntoIter = ArrivalEvents;

    fn into_iter(self) -> Self::IntoIter {
        self.events()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Batch {
    start: Duration,
    len: Duration,
    count: u64,
    emitted: u64,
}

/// Iterator over the arrivals of one run
///
/// Finite, strictly increasing in `scheduled_at`, and every timestamp is
/// below the schedule horizon.
#[derive(Debug, Clone)]
pub struct ArrivalEvents {
    scheduler: ArrivalScheduler,
    horizon: Duration,
    next_tick: Duration,
    carry: f64,
    batch: Batch,
    sequence: u64,
}

impl ArrivalEvents {
    /// Compute how many arrivals the next tick owes
    fn fill_batch(&mut self) -> bool {
        if self.next_tick >= self.horizon {
            return false;
        }

        let start = self.next_tick;
        let len = self.scheduler.tick.min(self.horizon - start);
        let midpoint = start + len / 2;

        let owed = self.carry + self.scheduler.rate_at(midpoint) * len.as_secs_f64();
        let count = owed.round().max(0.0);
        self.carry = owed - count;

        self.batch = Batch {
            start,
            len,
            count: count as u64,
            emitted: 0,
        };
        self.next_tick = start + len;
        true
    }
}

impl Iterator for ArrivalEvents {
    type Item = ArrivalEvent;

    fn next(&mut self) -> Option<Self::Item> {
        while self.batch.emitted >= self.batch.count {
            if !self.fill_batch() {
                return None;
            }
        }

        let batch = &mut self.batch;
        let offset_nanos =
            batch.len.as_nanos() * u128::from(batch.emitted) / u128::from(batch.count);
        let offset = Duration::from_nanos(offset_nanos as u64);
        batch.emitted += 1;

        let event = ArrivalEvent {
            scheduled_at: batch.start + offset,
            sequence: self.sequence,
        };
        self.sequence += 1;
        Some(event)
    }
}
