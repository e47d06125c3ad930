//! The load-sampling boundary consumed by the engine.

/// Produces the load percentage accumulated since the previous call.
///
/// Implementations return a value in `[0, 100]`, or `None` when the
/// reading is unavailable; unavailable readings are dropped by the engine
/// and retried on the next tick. The engine queries the sampler from a
/// single background task, once per tick.
pub trait LoadSampler: Send + 'static {
    fn sample(&mut self) -> Option<f64>;
}

/// Closures work as samplers, which keeps tests and demos short.
impl<F> LoadSampler for F
where
    F: FnMut() -> Option<f64> + Send + 'static,
{
    fn sample(&mut self) -> Option<f64> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_samplers() {
        let mut reading = 0.0;
        let mut sampler = move || {
            reading += 10.0;
            Some(reading)
        };
        assert_eq!(LoadSampler::sample(&mut sampler), Some(10.0));
        assert_eq!(LoadSampler::sample(&mut sampler), Some(20.0));
    }
}
