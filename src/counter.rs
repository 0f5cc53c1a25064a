use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{MetricError, Result};

/// How an OS counter derives its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Computed as a delta against the previous read. The first read after
    /// construction has no previous sample and is meaningless.
    Rate,
    /// Reports a current absolute value.
    Instantaneous,
}

impl CounterKind {
    pub fn needs_priming(self) -> bool {
        matches!(self, CounterKind::Rate)
    }
}

pub trait CounterSource: Send {
    fn kind(&self) -> CounterKind;

    fn next_value(&mut self) -> Result<f64>;

    /// Minimum delay between the priming read and the first read that is
    /// surfaced to a caller.
    fn settle_interval(&self) -> Duration {
        Duration::ZERO
    }
}

pub type CounterFactory = Box<dyn Fn() -> Result<Box<dyn CounterSource>> + Send + Sync>;

/// Discards the first read of a rate counter. Must run once, right after the
/// counter is constructed and before any of its values reach a consumer.
pub fn prime(source: &mut dyn CounterSource) -> Result<()> {
    if !source.kind().needs_priming() {
        return Ok(());
    }

    let discarded = source.next_value()?;
    debug!(discarded, "primed rate counter");

    let settle = source.settle_interval();
    if !settle.is_zero() {
        thread::sleep(settle);
    }
    Ok(())
}

enum CounterState {
    Uninitialized,
    Ready(Box<dyn CounterSource>),
    Failed(MetricError),
}

/// A counter handle built on first use and reused for the rest of the
/// process. The lock covers construction and every read, so concurrent
/// callers never construct twice and never interleave reads.
pub struct LazyCounter {
    resource: String,
    factory: CounterFactory,
    state: Mutex<CounterState>,
}

impl LazyCounter {
    pub fn new<F>(resource: &str, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn CounterSource>> + Send + Sync + 'static,
    {
        Self {
            resource: resource.to_string(),
            factory: Box::new(factory),
            state: Mutex::new(CounterState::Uninitialized),
        }
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        !matches!(*state, CounterState::Uninitialized)
    }

    pub fn read(&self) -> Result<f64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if matches!(*state, CounterState::Uninitialized) {
            *state = self.construct();
        }

        match &mut *state {
            CounterState::Ready(source) => source.next_value(),
            CounterState::Failed(error) => Err(error.clone()),
            CounterState::Uninitialized => Err(MetricError::initialization(
                &self.resource,
                "counter was not constructed",
            )),
        }
    }

    fn construct(&self) -> CounterState {
        let built = (self.factory)().and_then(|mut source| {
            prime(source.as_mut())?;
            Ok(source)
        });

        match built {
            Ok(source) => {
                debug!(resource = %self.resource, kind = ?source.kind(), "counter initialized");
                CounterState::Ready(source)
            }
            Err(e) => {
                warn!(resource = %self.resource, "counter initialization failed: {e}");
                let error = match e {
                    MetricError::InitializationFailure { .. } => e,
                    other => MetricError::initialization(&self.resource, other),
                };
                CounterState::Failed(error)
            }
        }
    }
}
