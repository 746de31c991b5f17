//! A per-process background thread that dispatches callbacks when registered
//! signals satisfy a wait condition — the realization of the `SetAsyncSignalHandler`
//! contract the queue lifecycle's scratch and exception handlers are built on.

use crate::kfd::device::KfdDevice;
use crate::thunk::events::EventManager;
use crate::thunk::signal::{HsaSignalCondition, HsaWaitState, Signal, wait_any};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// What a registered callback wants to happen to its own watch after running.
pub enum HandlerOutcome {
    /// Keep this exact (signal, condition, value) watch registered.
    Armed,
    /// Drop the watch. If the callback wants to keep watching under a new
    /// condition, it should call [`AsyncHandlerRegistry::register`] itself
    /// before returning this.
    Unarmed,
}

type Callback = Box<dyn FnMut() -> HandlerOutcome + Send>;

struct Watch {
    signal: Arc<Signal>,
    condition: HsaSignalCondition,
    value: i64,
    callback: Callback,
}

struct Inner {
    watches: Vec<Watch>,
    shutdown: bool,
}

/// Polls a small set of registered signals on a dedicated thread and invokes
/// each one's callback as soon as its condition is met.
pub struct AsyncHandlerRegistry {
    device: Arc<KfdDevice>,
    event_manager: Arc<EventManager>,
    state: Arc<(Mutex<Inner>, Condvar)>,
}

const POLL_CLOCKS: u64 = 100_000_000; // ~100ms at the 1GHz fallback frequency

impl AsyncHandlerRegistry {
    /// Spawns the dispatch thread and returns a handle to register watches on it.
    #[must_use]
    pub fn spawn(device: Arc<KfdDevice>, event_manager: Arc<EventManager>) -> Arc<Self> {
        let state = Arc::new((
            Mutex::new(Inner {
                watches: Vec::new(),
                shutdown: false,
            }),
            Condvar::new(),
        ));

        let registry = Arc::new(Self {
            device,
            event_manager,
            state,
        });

        let worker = registry.clone();
        thread::Builder::new()
            .name("hsa-async-signal".into())
            .spawn(move || worker.run())
            .expect("failed to spawn async signal handler thread");

        registry
    }

    /// Registers a one-shot watch: `callback` fires the next time `signal`'s
    /// value satisfies `condition` against `value`.
    pub fn register(
        &self,
        signal: Arc<Signal>,
        condition: HsaSignalCondition,
        value: i64,
        callback: Callback,
    ) {
        let (lock, cvar) = &*self.state;
        let mut inner = lock.lock().unwrap();
        inner.watches.push(Watch {
            signal,
            condition,
            value,
            callback,
        });
        cvar.notify_all();
    }

    pub fn shutdown(&self) {
        let (lock, cvar) = &*self.state;
        let mut inner = lock.lock().unwrap();
        inner.shutdown = true;
        cvar.notify_all();
    }

    fn run(&self) {
        loop {
            let (lock, cvar) = &*self.state;
            let mut guard = lock.lock().unwrap();

            while guard.watches.is_empty() && !guard.shutdown {
                let (g, _) = cvar
                    .wait_timeout(guard, Duration::from_millis(200))
                    .unwrap();
                guard = g;
            }

            if guard.shutdown {
                return;
            }

            let signals: Vec<Arc<Signal>> = guard.watches.iter().map(|w| w.signal.clone()).collect();
            let conditions: Vec<HsaSignalCondition> =
                guard.watches.iter().map(|w| w.condition).collect();
            let values: Vec<i64> = guard.watches.iter().map(|w| w.value).collect();
            drop(guard);

            let refs: Vec<&Signal> = signals.iter().map(Arc::as_ref).collect();
            let idx = wait_any(
                &refs,
                &conditions,
                &values,
                POLL_CLOCKS,
                HsaWaitState::Blocked,
                &self.device,
                &self.event_manager,
            );

            if idx >= refs.len() {
                // Poll window elapsed with nothing satisfied; loop and recheck.
                continue;
            }

            let mut guard = lock.lock().unwrap();
            if idx >= guard.watches.len() || !Arc::ptr_eq(&guard.watches[idx].signal, &signals[idx]) {
                // The watch list changed underneath us; re-scan next iteration.
                continue;
            }
            let mut watch = guard.watches.remove(idx);
            drop(guard);

            match (watch.callback)() {
                HandlerOutcome::Armed => {
                    let mut guard = lock.lock().unwrap();
                    guard.watches.push(watch);
                }
                HandlerOutcome::Unarmed => {}
            }
        }
    }
}
