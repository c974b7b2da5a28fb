//! Bounded retry loop around a whole connect / execute / close attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::RconError;

/// Process-level abort flag, raised by Ctrl-C once [`Interrupt::install`] ran.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes SIGINT / Ctrl-C into this flag instead of killing the process.
    pub fn install(&self) -> Result<(), RconError> {
        let raised = Arc::clone(&self.raised);
        ctrlc::set_handler(move || raised.store(true, Ordering::SeqCst))
            .map_err(|e| RconError::Internal(format!("Failed to install interrupt handler: {}", e)))
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Completed(T),
    Interrupted,
}

/// Runs `attempt` up to `attempts` times (at least once).
///
/// The closure receives the 1-based attempt number and owns whatever it opens,
/// so a failed attempt has already released its session by the time the error
/// reaches this loop.
pub fn run_with_retries<T, F>(
    attempts: u32,
    interrupt: &Interrupt,
    mut attempt: F,
) -> Result<RetryOutcome<T>, RconError>
where
    F: FnMut(u32) -> Result<T, RconError>,
{
    let attempts = attempts.max(1);

    let mut n = 1;
    loop {
        if interrupt.is_raised() {
            return Ok(RetryOutcome::Interrupted);
        }

        let err = match attempt(n) {
            Ok(value) => return Ok(RetryOutcome::Completed(value)),
            Err(err) => err,
        };

        if matches!(err, RconError::Interrupted) || interrupt.is_raised() {
            tracing::debug!(attempt = n, "attempt interrupted");
            return Ok(RetryOutcome::Interrupted);
        }

        // Left to the caller to report.
        if !err.is_retriable() {
            return Err(err);
        }

        tracing::warn!(attempt = n, of = attempts, "RCON Error: {}", err);
        if n == attempts {
            return Err(RconError::RetriesExhausted {
                attempts,
                source: Box::new(err),
            });
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fmt;
    use std::sync::Mutex;

    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Collects the `attempt` field of every warning.
    struct ReportedAttempts(Arc<Mutex<Vec<u64>>>);

    struct AttemptField(Option<u64>);

    impl Visit for AttemptField {
        fn record_u64(&mut self, field: &Field, value: u64) {
            if field.name() == "attempt" {
                self.0 = Some(value);
            }
        }

        fn record_debug(&mut self, _: &Field, _: &dyn fmt::Debug) {}
    }

    impl<S: Subscriber> Layer<S> for ReportedAttempts {
        fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
            if *event.metadata().level() != Level::WARN {
                return;
            }
            let mut field = AttemptField(None);
            event.record(&mut field);
            if let Some(n) = field.0 {
                self.0.lock().unwrap().push(n);
            }
        }
    }

    fn reported_attempts<T>(run: impl FnOnce() -> T) -> (T, Vec<u64>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(ReportedAttempts(Arc::clone(&seen)));
        let result = tracing::subscriber::with_default(subscriber, run);
        let seen = seen.lock().unwrap().clone();
        (result, seen)
    }

    /// Counts drops the way a session guard releases its connection.
    struct Guard<'a>(&'a Cell<u32>);

    impl Drop for Guard<'_> {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_succeeds_on_third_attempt() {
        let opens = Cell::new(0);
        let closes = Cell::new(0);

        let outcome = run_with_retries(3, &Interrupt::new(), |n| {
            opens.set(opens.get() + 1);
            if n < 3 {
                return Err(RconError::ConnectionTimeout);
            }
            let _session = Guard(&closes);
            Ok("pong")
        })
        .unwrap();

        assert_eq!(outcome, RetryOutcome::Completed("pong"));
        assert_eq!(opens.get(), 3);
        assert!(closes.get() <= 3);
    }

    #[test]
    fn test_success_short_circuits() {
        let calls = Cell::new(0);
        let outcome = run_with_retries(5, &Interrupt::new(), |_| {
            calls.set(calls.get() + 1);
            Ok(())
        })
        .unwrap();

        assert_eq!(outcome, RetryOutcome::Completed(()));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_exhausted_after_configured_attempts() {
        let calls = Cell::new(0);
        let result: Result<RetryOutcome<()>, _> = run_with_retries(2, &Interrupt::new(), |_| {
            calls.set(calls.get() + 1);
            Err(RconError::ConnectionTimeout)
        });

        assert_eq!(calls.get(), 2);
        match result {
            Err(RconError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, RconError::ConnectionTimeout));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_each_failed_attempt_is_reported() {
        let (result, attempts) = reported_attempts(|| {
            run_with_retries::<(), _>(2, &Interrupt::new(), |_| Err(RconError::ConnectionTimeout))
        });

        assert!(matches!(result, Err(RconError::RetriesExhausted { attempts: 2, .. })));
        assert_eq!(attempts, vec![1, 2]);
    }

    #[test]
    fn test_non_retriable_error_is_left_to_caller() {
        let (result, attempts) = reported_attempts(|| {
            run_with_retries::<(), _>(3, &Interrupt::new(), |_| {
                Err(RconError::Internal("boom".into()))
            })
        });

        assert!(matches!(result, Err(RconError::Internal(_))));
        assert!(attempts.is_empty());
    }

    #[test]
    fn test_session_released_on_every_failed_attempt() {
        let closes = Cell::new(0);
        let result: Result<RetryOutcome<()>, _> = run_with_retries(3, &Interrupt::new(), |_| {
            let _session = Guard(&closes);
            Err(RconError::ServerTimeout)
        });

        assert!(result.is_err());
        assert_eq!(closes.get(), 3);
    }

    #[test]
    fn test_non_retriable_error_stops_loop() {
        let calls = Cell::new(0);
        let result: Result<RetryOutcome<()>, _> = run_with_retries(3, &Interrupt::new(), |_| {
            calls.set(calls.get() + 1);
            Err(RconError::InvalidEndpoint("empty host".into()))
        });

        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(RconError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_interrupt_breaks_loop() {
        let interrupt = Interrupt::new();
        let calls = Cell::new(0);
        let closes = Cell::new(0);

        let outcome: RetryOutcome<()> = run_with_retries(3, &interrupt, |_| {
            calls.set(calls.get() + 1);
            let _session = Guard(&closes);
            interrupt.raise();
            Err(RconError::ServerTimeout)
        })
        .unwrap();

        assert_eq!(outcome, RetryOutcome::Interrupted);
        assert_eq!(calls.get(), 1);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_interrupted_error_breaks_loop() {
        let calls = Cell::new(0);
        let outcome: RetryOutcome<()> = run_with_retries(3, &Interrupt::new(), |_| {
            calls.set(calls.get() + 1);
            Err(RconError::Interrupted)
        })
        .unwrap();

        assert_eq!(outcome, RetryOutcome::Interrupted);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_raised_before_start_skips_attempts() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        let outcome: RetryOutcome<()> =
            run_with_retries(3, &interrupt, |_| panic!("no attempt expected")).unwrap();
        assert_eq!(outcome, RetryOutcome::Interrupted);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let calls = Cell::new(0);
        let _ = run_with_retries(0, &Interrupt::new(), |_| {
            calls.set(calls.get() + 1);
            Err::<(), _>(RconError::ConnectionTimeout)
        });
        assert_eq!(calls.get(), 1);
    }
}
