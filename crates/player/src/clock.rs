//! Wall clock used to turn absolute start times into local delays.

use shared::EpochMillis;

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> EpochMillis;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> EpochMillis {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock driven by tokio's (pausable) timer, anchored at a fixed epoch.
#[cfg(test)]
pub(crate) struct TokioClock {
    origin: tokio::time::Instant,
    epoch: EpochMillis,
}

#[cfg(test)]
impl TokioClock {
    pub(crate) fn new(epoch: EpochMillis) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            epoch,
        }
    }
}

#[cfg(test)]
impl Clock for TokioClock {
    fn now_ms(&self) -> EpochMillis {
        self.epoch + self.origin.elapsed().as_millis() as EpochMillis
    }
}
