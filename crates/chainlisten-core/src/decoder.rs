//! Decode strategy injected into a listener.

use std::marker::PhantomData;

use crate::error::DecodeError;
use crate::types::RawLog;

/// Turns one raw log into a typed domain event.
pub trait LogDecoder: Send + Sync {
    /// The domain event produced.
    type Event: Send + 'static;

    fn decode(&self, log: &RawLog) -> Result<Self::Event, DecodeError>;
}

/// Adapts a plain function or closure into a [`LogDecoder`].
///
/// ```
/// use chainlisten_core::{DecodeFn, LogDecoder, RawLog};
///
/// let blocks = DecodeFn::new(|log: &RawLog| Ok(log.block_number));
/// # let _ = &blocks as &dyn LogDecoder<Event = u64>;
/// ```
pub struct DecodeFn<F, E> {
    f: F,
    _event: PhantomData<fn() -> E>,
}

impl<F, E> DecodeFn<F, E>
where
    F: Fn(&RawLog) -> Result<E, DecodeError> + Send + Sync,
    E: Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: PhantomData,
        }
    }
}

impl<F, E> LogDecoder for DecodeFn<F, E>
where
    F: Fn(&RawLog) -> Result<E, DecodeError> + Send + Sync,
    E: Send + 'static,
{
    type Event = E;

    fn decode(&self, log: &RawLog) -> Result<E, DecodeError> {
        (self.f)(log)
    }
}
