//! Countdown ticker bookkeeping
//!
//! The countdown is either stopped or running a single ticker task. Each
//! ticker is tagged with a generation; stopping or finishing bumps the
//! generation so a ticker that was cancelled while mid-flight can tell that
//! it no longer owns the clock.

use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{Instrument, Span};

/// Whether the countdown driver is ticking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No ticker is scheduled
    Stopped,
    /// A ticker fires every tick interval
    Running,
}

/// Owner of the at-most-one ticker task
#[derive(Debug, Default)]
pub(crate) struct Countdown {
    generation: u64,
    ticker: Option<JoinHandle<()>>,
}

impl Countdown {
    pub(crate) fn phase(&self) -> Phase {
        match self.ticker {
            Some(_) => Phase::Running,
            None => Phase::Stopped,
        }
    }

    /// Starts a ticker through `spawn` unless one is already running
    ///
    /// `spawn` receives the generation the new ticker must present on every
    /// tick. Returns whether a ticker was started.
    pub(crate) fn start(&mut self, spawn: impl FnOnce(u64) -> JoinHandle<()>) -> bool {
        if self.ticker.is_some() {
            return false;
        }

        self.generation += 1;
        self.ticker = Some(spawn(self.generation));
        true
    }

    /// Cancels the running ticker, returning whether there was one
    pub(crate) fn stop(&mut self) -> bool {
        match self.ticker.take() {
            Some(ticker) => {
                ticker.abort();
                self.generation += 1;
                true
            }
            None => false,
        }
    }

    /// Whether the ticker of `generation` still owns the clock
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.ticker.is_some() && self.generation == generation
    }

    /// Called from within the ticker of `generation` when the clock ran out
    ///
    /// The handle is released without aborting since the caller is the
    /// ticker task itself and is about to return.
    pub(crate) fn finish(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.ticker = None;
            self.generation += 1;
        }
    }
}

/// Spawns a task calling `on_tick` once per `period`
///
/// The first call happens one full period after spawning. The task ends as
/// soon as `on_tick` returns `false`.
pub(crate) fn spawn_ticker<F>(period: Duration, span: Span, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    tokio::spawn(
        async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if !on_tick() {
                    break;
                }
            }
        }
        .instrument(span),
    )
}
