//! Process-wide, initialize-once runtime state.
//!
//! Mono and the .NET Framework can be started at most once per process and have no usable
//! teardown. [`GlobalRuntime`] models that as an explicit state machine:
//!
//! ```text
//! Uninitialized ──► Initializing ──► Initialized(Arc<T>)
//!                        │
//!                        └─────────► Failed(message)
//! ```
//!
//! Exactly one thread runs the startup closure. Threads arriving while it runs block until it
//! finishes and then observe the outcome. A failure before the runtime was touched
//! ([`StartupError::Retryable`]) puts the slot back to `Uninitialized`, so the next caller
//! starts over with its own configuration. A failure after that point
//! ([`StartupError::Fatal`]) is remembered and reported to every later attempt.

use std::sync::{Arc, Condvar, Mutex};

use crate::{backend::BackendKind, Error, Result};

/// Why a startup closure gave up.
#[derive(Debug)]
pub(crate) enum StartupError {
    /// Nothing irreversible happened yet (lookup, validation, library loading)
    Retryable(Error),
    /// The runtime was entered; the process cannot start it again
    Fatal(Error),
}

impl From<Error> for StartupError {
    fn from(error: Error) -> Self {
        StartupError::Retryable(error)
    }
}

enum InitState<T> {
    Uninitialized,
    Initializing,
    Initialized(Arc<T>),
    Failed(String),
}

/// A process-wide runtime slot.
pub(crate) struct GlobalRuntime<T> {
    backend: BackendKind,
    state: Mutex<InitState<T>>,
    ready: Condvar,
}

impl<T> GlobalRuntime<T> {
    pub(crate) const fn new(backend: BackendKind) -> Self {
        GlobalRuntime {
            backend,
            state: Mutex::new(InitState::Uninitialized),
            ready: Condvar::new(),
        }
    }

    /// Returns the live runtime, running `init` first if nobody has yet.
    ///
    /// # Errors
    ///
    /// Returns the error of `init` if this call ran it and it failed, and
    /// [`crate::Error::RuntimeInitialization`] if an earlier attempt failed fatally.
    pub(crate) fn get_or_init<F>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> std::result::Result<T, StartupError>,
    {
        {
            let mut state = lock!(self.state);
            loop {
                match &*state {
                    InitState::Initialized(runtime) => return Ok(Arc::clone(runtime)),
                    InitState::Failed(message) => {
                        return Err(init_error!(
                            self.backend,
                            "an earlier initialization attempt failed: {}",
                            message
                        ))
                    }
                    InitState::Uninitialized => break,
                    InitState::Initializing => {}
                }
                state = self.ready.wait(state).map_err(|_| crate::Error::LockError)?;
            }
            *state = InitState::Initializing;
        }

        let mut guard = PanicGuard {
            slot: self,
            armed: true,
        };
        let outcome = init();
        guard.armed = false;

        let mut state = lock!(self.state);
        let result = match outcome {
            Ok(runtime) => {
                let runtime = Arc::new(runtime);
                *state = InitState::Initialized(Arc::clone(&runtime));
                Ok(runtime)
            }
            Err(StartupError::Retryable(error)) => {
                *state = InitState::Uninitialized;
                Err(error)
            }
            Err(StartupError::Fatal(error)) => {
                *state = InitState::Failed(error.to_string());
                Err(error)
            }
        };
        self.ready.notify_all();
        result
    }

    /// Returns the live runtime without initializing it.
    #[cfg(test)]
    pub(crate) fn get(&self) -> Option<Arc<T>> {
        match &*self.state.lock().ok()? {
            InitState::Initialized(runtime) => Some(Arc::clone(runtime)),
            _ => None,
        }
    }
}

/// Marks the slot as failed if the startup closure unwinds, so waiters do not hang.
struct PanicGuard<'a, T> {
    slot: &'a GlobalRuntime<T>,
    armed: bool,
}

impl<T> Drop for PanicGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.slot.state.lock() {
            *state = InitState::Failed("initialization panicked".to_string());
        }
        self.slot.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn initializes_once() {
        let slot = GlobalRuntime::<u32>::new(BackendKind::Mono);
        let calls = AtomicUsize::new(0);

        assert!(slot.get().is_none());

        let first = slot
            .get_or_init(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .unwrap();
        let second = slot
            .get_or_init(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .unwrap();

        assert_eq!(*first, 42);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(slot.get().as_deref(), Some(&42));
    }

    #[test]
    fn fatal_failure_is_not_retried() {
        let slot = GlobalRuntime::<u32>::new(BackendKind::NetFx);
        let calls = AtomicUsize::new(0);

        let first = slot.get_or_init(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StartupError::Fatal(init_error!(
                BackendKind::NetFx,
                "loader missing"
            )))
        });
        assert!(matches!(first, Err(Error::RuntimeInitialization { .. })));

        let second = slot.get_or_init(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        match second {
            Err(Error::RuntimeInitialization { backend, message }) => {
                assert_eq!(backend, BackendKind::NetFx);
                assert!(message.contains("loader missing"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.get().is_none());
    }

    #[test]
    fn retryable_failure_leaves_slot_uninitialized() {
        let slot = GlobalRuntime::<u32>::new(BackendKind::Mono);

        let first = slot.get_or_init(|| Err(init_error!(BackendKind::Mono, "first path").into()));
        match first {
            Err(Error::RuntimeInitialization { message, .. }) => assert_eq!(message, "first path"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(slot.get().is_none());

        // The next caller's own configuration is evaluated, not the stale error.
        let second = slot.get_or_init(|| Err(init_error!(BackendKind::Mono, "second path").into()));
        match second {
            Err(Error::RuntimeInitialization { message, .. }) => {
                assert_eq!(message, "second path");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assert_eq!(*slot.get_or_init(|| Ok(3)).unwrap(), 3);
    }

    #[test]
    fn concurrent_callers_share_one_initialization() {
        let slot = GlobalRuntime::<usize>::new(BackendKind::Mono);
        let calls = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        slot.get_or_init(|| {
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(calls.fetch_add(1, Ordering::SeqCst))
                        })
                        .unwrap()
                    })
                })
                .collect();

            for handle in handles {
                assert_eq!(*handle.join().unwrap(), 0);
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_initializer_marks_failure() {
        let slot = GlobalRuntime::<u32>::new(BackendKind::Mono);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = slot.get_or_init(|| panic!("boom"));
        }));
        assert!(result.is_err());

        match slot.get_or_init(|| Ok(1)) {
            Err(Error::RuntimeInitialization { message, .. }) => {
                assert!(message.contains("panicked"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
