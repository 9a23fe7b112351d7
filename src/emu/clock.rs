use std::{sync::Arc, time::Duration};

use tokio::{
    runtime::{Builder, Runtime},
    time::{interval, Interval, MissedTickBehavior},
};

use super::{EResult, EmuError};

/// Paces instruction issue at a fixed rate.
pub struct Clock {
    interval: Interval,
    rt: Runtime,
}

impl Clock {
    /// # Errors
    ///
    /// This function will return an error if the rate is not a positive, finite frequency,
    /// or if the Tokio runtime fails to initialize.
    pub fn new(rate_hz: f64) -> EResult<Self> {
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(EmuError::InvalidClockRate(rate_hz));
        }
        let period = Duration::try_from_secs_f64(rate_hz.recip())
            .map_err(|_| EmuError::InvalidClockRate(rate_hz))?;
        if period.is_zero() {
            return Err(EmuError::InvalidClockRate(rate_hz));
        }
        let rt = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|err| EmuError::ClockInit(Arc::new(err)))?;
        let interval = rt.block_on(async {
            let mut clock = interval(period);
            clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
            clock
        });
        Ok(Self { interval, rt })
    }

    /// Blocks until the next clock edge.
    pub fn tick(&mut self) {
        // snap!
        self.rt.block_on(self.interval.tick());
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}
