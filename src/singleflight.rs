//! De-duplication of concurrent loads of the same key.
//!
//! Grounded on the Go source's `common/singleflight.go` (`sync.WaitGroup`
//! rendezvous). There is no `sync.WaitGroup` equivalent in the standard
//! library or this crate's dependency graph, so the call record is
//! reimplemented with `parking_lot::{Mutex, Condvar}` — the same "pending
//! until signaled, then every waiter reads the same stored result" shape.
//!
//! A single `Group` is shared by one `Cache<V>` across every `get_or_load`
//! call, but each call is generic over its own loader error type `E`. The
//! call record therefore stores its result as `Box<dyn Any + Send>` rather
//! than fixing `R`/`E` at the `Group` level, and `do_call` downcasts it back
//! on the way out.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct CallState {
    completed: bool,
    result: Option<Box<dyn Any + Send>>,
}

struct Call {
    state: Mutex<CallState>,
    cond: Condvar,
}

/// A namespace of in-flight calls, keyed by string.
pub struct Group {
    calls: Mutex<HashMap<String, Arc<Call>>>,
}

impl Group {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` for `key`, making sure only one execution is in flight at a
    /// time. Duplicate callers block until the original completes and
    /// receive a clone of the same result.
    ///
    /// If `f` panics, every waiter (including ones that arrive after the
    /// panic but before this call returns) is released from its wait and
    /// itself panics, rather than deadlocking — but the original panic
    /// payload only propagates in the thread that ran `f`.
    pub fn do_call<R, E, F>(&self, key: &str, f: F) -> Result<R, E>
    where
        R: Clone + Send + 'static,
        E: Clone + Send + 'static,
        F: FnOnce() -> Result<R, E>,
    {
        let mut calls = self.calls.lock();
        if let Some(call) = calls.get(key).cloned() {
            drop(calls);
            return Self::wait(&call);
        }

        let call = Arc::new(Call {
            state: Mutex::new(CallState {
                completed: false,
                result: None,
            }),
            cond: Condvar::new(),
        });
        calls.insert(key.to_string(), call.clone());
        drop(calls);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        self.calls.lock().remove(key);

        match outcome {
            Ok(result) => {
                let boxed: Box<dyn Any + Send> = Box::new(result.clone());
                let mut state = call.state.lock();
                state.result = Some(boxed);
                state.completed = true;
                drop(state);
                call.cond.notify_all();
                result
            }
            Err(payload) => {
                let mut state = call.state.lock();
                state.completed = true;
                drop(state);
                call.cond.notify_all();
                std::panic::resume_unwind(payload);
            }
        }
    }

    fn wait<R, E>(call: &Call) -> Result<R, E>
    where
        R: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        let mut state = call.state.lock();
        while !state.completed {
            call.cond.wait(&mut state);
        }
        match state.result.as_ref() {
            Some(boxed) => boxed
                .downcast_ref::<Result<R, E>>()
                .expect("single-flight: concurrent do_call for the same key used different types")
                .clone(),
            // The primary caller's `f` panicked; don't fabricate a result
            // of a type we can't construct generically.
            None => panic!("single-flight: loader panicked"),
        }
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn single_caller_gets_result() {
        let group = Group::new();
        let result: Result<i32, String> = group.do_call("k", || Ok(42));
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn concurrent_callers_collapse_into_one_invocation() {
        let group = Arc::new(Group::new());
        let calls = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(Barrier::new(5));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let group = group.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    group.do_call("shared", || {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        // Give other threads a chance to pile up as
                        // duplicate waiters while this is "in flight".
                        thread::sleep(std::time::Duration::from_millis(20));
                        Ok::<u32, String>(n)
                    })
                })
            })
            .collect();

        let results: Vec<Result<u32, String>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "loader should run exactly once");
        for r in &results {
            assert_eq!(*r, Ok(0));
        }
    }

    #[test]
    fn different_keys_run_independently() {
        let group = Group::new();
        let a: Result<i32, String> = group.do_call("a", || Ok(1));
        let b: Result<i32, String> = group.do_call("b", || Ok(2));
        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(2));
    }

    #[test]
    fn error_propagates_and_is_not_retried_by_duplicates() {
        let group = Arc::new(Group::new());
        let attempts = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(Barrier::new(3));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let group = group.clone();
                let attempts = attempts.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let result: Result<i32, String> = group.do_call("failing", || {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(10));
                        Err("boom".to_string())
                    });
                    result
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), Err("boom".to_string()));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn call_is_removed_after_completion_so_a_later_call_reruns() {
        let group = Group::new();
        let calls = AtomicU32::new(0);
        let _: Result<i32, String> = group.do_call("k", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        let _: Result<i32, String> = group.do_call("k", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
