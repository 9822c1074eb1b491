/// Single-topic typed event emitter
///
/// Fans a payload of one fixed type out to every registered listener,
/// synchronously and in registration order. Used for in-process
/// notifications: pushed backend events, store changes, UI signals.
///
/// - `emit` iterates over a snapshot taken when the call starts, so a
///   listener may add or remove listeners (itself included) mid-emit without
///   skipping or repeating anyone in that round.
/// - A panicking listener is caught, logged and skipped; the rest still run.
/// - Registering the same listener twice registers it twice.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// Listener callback. Identity is the `Arc` allocation, so keep the handle
/// returned by [`listener`] around if you want to remove it later.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Wrap a closure into a [`Listener`]
pub fn listener<T, F>(f: F) -> Listener<T>
where
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Outcome of a single `emit` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Listeners that were invoked (including ones that panicked)
    pub notified: usize,

    /// Listeners that panicked while handling the payload
    pub panicked: usize,
}

impl EmitReport {
    /// True when every notified listener returned normally
    pub fn is_clean(&self) -> bool {
        self.panicked == 0
    }
}

/// In-memory, single-topic notification channel
pub struct Emitter<T> {
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T> Emitter<T> {
    /// Create an emitter with no listeners
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener at the end of the sequence
    pub fn on(&self, listener: Listener<T>) {
        let mut listeners = self.lock();
        listeners.push(listener);
        debug!("Listener registered ({} total)", listeners.len());
    }

    /// Remove the first occurrence of `listener`
    ///
    /// Removing a listener that is not registered is a no-op. Returns whether
    /// an entry was removed.
    pub fn off(&self, listener: &Listener<T>) -> bool {
        let mut listeners = self.lock();

        match listeners.iter().position(|l| same_listener(l, listener)) {
            Some(index) => {
                listeners.remove(index);
                debug!("Listener removed ({} remaining)", listeners.len());
                true
            }
            None => false,
        }
    }

    /// Invoke every listener registered at the moment of the call, in order
    pub fn emit(&self, data: &T) -> EmitReport {
        // Lock is released before any listener runs
        let snapshot: Vec<Listener<T>> = self.lock().clone();
        let mut report = EmitReport::default();

        for listener in snapshot {
            report.notified += 1;

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(data))) {
                report.panicked += 1;
                error!("Listener panicked during emit: {}", panic_message(&*payload));
            }
        }

        report
    }

    /// Number of registered entries (duplicates counted)
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `listener` is currently registered at least once
    pub fn contains(&self, listener: &Listener<T>) -> bool {
        self.lock().iter().any(|l| same_listener(l, listener))
    }

    /// Remove all listeners
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Listener<T>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Compare data pointers only; vtable pointers of the same closure may differ
fn same_listener<T>(a: &Listener<T>, b: &Listener<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, name: &'static str) -> Listener<i32> {
        let log = log.clone();
        listener(move |x: &i32| log.lock().unwrap().push(format!("{}({})", name, x)))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_new_emitter_is_empty() {
        let emitter: Emitter<i32> = Emitter::new();
        assert!(emitter.is_empty());
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_emit_without_listeners_is_noop() {
        let emitter: Emitter<i32> = Emitter::default();
        let report = emitter.emit(&7);
        assert_eq!(report, EmitReport::default());
    }

    #[test]
    fn test_listeners_called_in_registration_order() {
        let log = Log::default();
        let emitter = Emitter::new();

        emitter.on(recorder(&log, "L1"));
        emitter.on(recorder(&log, "L2"));
        emitter.on(recorder(&log, "L3"));

        let report = emitter.emit(&1);

        assert_eq!(report.notified, 3);
        assert_eq!(entries(&log), vec!["L1(1)", "L2(1)", "L3(1)"]);
    }

    #[test]
    fn test_off_removes_middle_listener() {
        let log = Log::default();
        let emitter = Emitter::new();
        let l1 = recorder(&log, "L1");
        let l2 = recorder(&log, "L2");
        let l3 = recorder(&log, "L3");

        emitter.on(l1);
        emitter.on(l2.clone());
        emitter.on(l3);

        assert!(emitter.off(&l2));
        emitter.emit(&42);

        assert_eq!(entries(&log), vec!["L1(42)", "L3(42)"]);
    }

    #[test]
    fn test_off_unregistered_is_noop() {
        let log = Log::default();
        let emitter = Emitter::new();
        let registered = recorder(&log, "A");
        let stranger = recorder(&log, "B");

        emitter.on(registered.clone());

        assert!(!emitter.off(&stranger), "Unknown listener should not be removed");
        assert_eq!(emitter.listener_count(), 1);

        assert!(emitter.off(&registered));
        assert!(!emitter.off(&registered), "Second removal should be a no-op");
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_duplicate_registration_fires_twice() {
        let log = Log::default();
        let emitter = Emitter::new();
        let l = recorder(&log, "L");

        emitter.on(l.clone());
        emitter.on(l.clone());
        emitter.emit(&5);
        assert_eq!(entries(&log), vec!["L(5)", "L(5)"]);

        // One off removes one occurrence
        assert!(emitter.off(&l));
        assert_eq!(emitter.listener_count(), 1);
        assert!(emitter.contains(&l));
    }

    #[test]
    fn test_equal_closures_have_distinct_identity() {
        let emitter: Emitter<i32> = Emitter::new();
        let a = listener(|_: &i32| {});
        let b = listener(|_: &i32| {});

        emitter.on(a.clone());
        assert!(!emitter.off(&b));
        assert!(emitter.off(&a));
    }

    #[test]
    fn test_self_removal_during_emit_uses_snapshot() {
        let log = Log::default();
        let emitter = Arc::new(Emitter::new());
        let slot: Arc<OnceLock<Listener<i32>>> = Arc::new(OnceLock::new());

        let once = {
            let emitter = emitter.clone();
            let slot = slot.clone();
            let log = log.clone();
            listener(move |x: &i32| {
                log.lock().unwrap().push(format!("once({})", x));
                if let Some(me) = slot.get() {
                    emitter.off(me);
                }
            })
        };
        slot.set(once.clone()).ok();

        emitter.on(recorder(&log, "L1"));
        emitter.on(once);
        emitter.on(recorder(&log, "L3"));

        emitter.emit(&1);
        emitter.emit(&2);

        assert_eq!(
            entries(&log),
            vec!["L1(1)", "once(1)", "L3(1)", "L1(2)", "L3(2)"]
        );
    }

    #[test]
    fn test_removing_later_listener_during_emit_does_not_skip_it() {
        let log = Log::default();
        let emitter = Arc::new(Emitter::new());
        let victim = recorder(&log, "victim");

        let remover = {
            let emitter = emitter.clone();
            let victim = victim.clone();
            listener(move |_: &i32| {
                emitter.off(&victim);
            })
        };

        emitter.on(remover);
        emitter.on(victim);

        emitter.emit(&1);
        emitter.emit(&2);

        assert_eq!(entries(&log), vec!["victim(1)"]);
    }

    #[test]
    fn test_listener_added_during_emit_waits_for_next_emit() {
        let log = Log::default();
        let emitter = Arc::new(Emitter::new());
        let late = recorder(&log, "late");

        let adder = {
            let emitter = emitter.clone();
            let late = late.clone();
            listener(move |_: &i32| {
                if !emitter.contains(&late) {
                    emitter.on(late.clone());
                }
            })
        };

        emitter.on(adder);
        emitter.emit(&1);
        assert!(entries(&log).is_empty());

        emitter.emit(&2);
        assert_eq!(entries(&log), vec!["late(2)"]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let log = Log::default();
        let emitter = Emitter::new();

        emitter.on(recorder(&log, "before"));
        emitter.on(listener(|_: &i32| panic!("listener failure")));
        emitter.on(recorder(&log, "after"));

        let report = emitter.emit(&9);

        assert_eq!(report.notified, 3);
        assert_eq!(report.panicked, 1);
        assert!(!report.is_clean());
        assert_eq!(entries(&log), vec!["before(9)", "after(9)"]);
        assert_eq!(emitter.listener_count(), 3, "Panicking listener stays registered");
    }

    #[test]
    fn test_clear_removes_all() {
        let log = Log::default();
        let emitter = Emitter::new();
        emitter.on(recorder(&log, "A"));
        emitter.on(recorder(&log, "B"));

        emitter.clear();
        emitter.emit(&1);

        assert!(emitter.is_empty());
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_emitter_shared_across_threads() {
        let emitter: Arc<Emitter<usize>> = Arc::new(Emitter::new());
        let total = Arc::new(Mutex::new(0usize));

        {
            let total = total.clone();
            emitter.on(listener(move |n: &usize| *total.lock().unwrap() += n));
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let emitter = emitter.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        emitter.emit(&1);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*total.lock().unwrap(), 100);
    }
}
