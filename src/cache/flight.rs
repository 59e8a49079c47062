/// In-process single-flight registry
///
/// The first caller for a key becomes the leader and runs the work; callers
/// arriving while it runs block until the leader publishes its outcome and
/// then receive a clone of it. If the leader unwinds before publishing, the
/// flight is marked abandoned and one of the waiters takes over.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

enum State<T> {
    Pending,
    Done(T),
    Abandoned,
}

struct Flight<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> Flight<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending),
            ready: Condvar::new(),
        }
    }

    fn settle(&self, state: State<T>) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = state;
        self.ready.notify_all();
    }
}

/// Outcome of [`FlightRegistry::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shared<T> {
    pub value: T,
    /// Whether this caller ran the work itself.
    pub leader: bool,
}

pub struct FlightRegistry<K, T> {
    flights: Mutex<HashMap<K, Arc<Flight<T>>>>,
}

impl<K, T> Default for FlightRegistry<K, T> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T> FlightRegistry<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless another caller is already running it.
    pub fn run<F>(&self, key: &K, work: F) -> Shared<T>
    where
        F: FnOnce() -> T,
    {
        loop {
            let (flight, leader) = {
                let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
                match flights.get(key) {
                    Some(flight) => (Arc::clone(flight), false),
                    None => {
                        let flight = Arc::new(Flight::new());
                        flights.insert(key.clone(), Arc::clone(&flight));
                        (flight, true)
                    }
                }
            };

            if leader {
                let guard = LeaderGuard {
                    registry: self,
                    key,
                    flight,
                    published: false,
                };
                let value = work();
                guard.publish(value.clone());
                return Shared {
                    value,
                    leader: true,
                };
            }

            if let Some(value) = wait(&flight) {
                return Shared {
                    value,
                    leader: false,
                };
            }

            tracing::debug!("[polybuild] Flight leader abandoned work, retrying");
        }
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn retire(&self, key: &K, flight: &Arc<Flight<T>>) {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if flights.get(key).is_some_and(|f| Arc::ptr_eq(f, flight)) {
            flights.remove(key);
        }
    }
}

/// Block until the flight settles; `None` means the leader abandoned it.
fn wait<T: Clone>(flight: &Flight<T>) -> Option<T> {
    let mut state = flight.state.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        match &*state {
            State::Pending => {
                state = flight
                    .ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            State::Done(value) => return Some(value.clone()),
            State::Abandoned => return None,
        }
    }
}

struct LeaderGuard<'a, K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    registry: &'a FlightRegistry<K, T>,
    key: &'a K,
    flight: Arc<Flight<T>>,
    published: bool,
}

impl<K, T> LeaderGuard<'_, K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    fn publish(mut self, value: T) {
        self.flight.settle(State::Done(value));
        self.registry.retire(self.key, &self.flight);
        self.published = true;
    }
}

impl<K, T> Drop for LeaderGuard<'_, K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    fn drop(&mut self) {
        if !self.published {
            self.flight.settle(State::Abandoned);
            self.registry.retire(self.key, &self.flight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_caller_leads() {
        let registry: FlightRegistry<u32, String> = FlightRegistry::new();
        let shared = registry.run(&1, || "done".to_string());
        assert!(shared.leader);
        assert_eq!(shared.value, "done");
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn test_concurrent_callers_share_one_run() {
        let registry: FlightRegistry<u32, usize> = FlightRegistry::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        let results: Vec<Shared<usize>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.run(&7, || {
                            thread::sleep(Duration::from_millis(100));
                            calls.fetch_add(1, Ordering::SeqCst) + 41
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| r.leader).count(), 1);
        assert!(results.iter().all(|r| r.value == 41));
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let registry: FlightRegistry<u32, u32> = FlightRegistry::new();
        let calls = AtomicUsize::new(0);

        thread::scope(|s| {
            for key in 0..4u32 {
                let registry = &registry;
                let calls = &calls;
                s.spawn(move || {
                    registry.run(&key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        key
                    })
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_failure_outcome_is_shared() {
        let registry: FlightRegistry<u32, Result<u32, String>> = FlightRegistry::new();
        let shared = registry.run(&1, || Err("compile failed".to_string()));
        assert_eq!(shared.value, Err("compile failed".to_string()));
    }

    #[test]
    fn test_leader_panic_hands_over_to_waiter() {
        let registry: FlightRegistry<u32, u32> = FlightRegistry::new();
        let leader_started = Barrier::new(2);

        thread::scope(|s| {
            let leader = s.spawn(|| {
                panic::catch_unwind(AssertUnwindSafe(|| {
                    registry.run(&9, || {
                        leader_started.wait();
                        thread::sleep(Duration::from_millis(100));
                        panic!("compiler crashed");
                    })
                }))
            });

            let follower = s.spawn(|| {
                leader_started.wait();
                registry.run(&9, || 5)
            });

            assert!(leader.join().unwrap().is_err());
            let shared = follower.join().unwrap();
            assert_eq!(shared.value, 5);
            assert!(shared.leader);
        });

        assert_eq!(registry.in_flight(), 0);
    }
}
