// src/context.rs
use std::sync::Mutex;

use crate::http::{Exchange, Request, Response};

/// The reusable part of a request context: everything that survives between
/// requests inside the pool. Path-parameter storage keeps its allocation
/// across requests; only the entries are cleared.
#[derive(Debug, Default)]
pub struct ContextState {
    pub(crate) params: Vec<(String, String)>,
    pub(crate) skip_view: bool,
}

impl ContextState {
    /// Invariant: a state must pass through here before re-entering the
    /// pool. Stale params or flags must never leak across requests.
    pub(crate) fn reset(&mut self) {
        self.params.clear();
        self.skip_view = false;
    }
}

/// Per-request context passed through the middleware chain and the view.
/// Borrows the raw exchange for the duration of the dispatch call; the
/// pooled state is bound on acquire and released when the request is done.
pub struct Context<'a> {
    pub(crate) exchange: &'a mut Exchange,
    pub(crate) state: &'a mut ContextState,
}

impl<'a> Context<'a> {
    pub(crate) fn new(exchange: &'a mut Exchange, state: &'a mut ContextState) -> Self {
        Context { exchange, state }
    }

    pub fn request(&self) -> &Request {
        &self.exchange.request
    }

    pub fn response(&mut self) -> &mut Response {
        &mut self.exchange.response
    }

    /// Named path parameter captured by the route pattern (`:name`, `*name`).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.state
            .params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.state.params
    }

    /// Tell the dispatcher to bypass the view body. After-middleware still
    /// runs as if the view had succeeded.
    pub fn skip_view(&mut self) {
        self.state.skip_view = true;
    }

    pub fn view_skipped(&self) -> bool {
        self.state.skip_view
    }
}

/// Free-list of context states, handed out one per in-flight request.
///
/// Owned by the compiled [`Dispatch`](crate::Dispatch) rather than living as
/// a process global, so independent server instances never share pools and
/// tests stay hermetic. Correctness does not depend on pooling: a miss just
/// allocates a fresh state.
pub struct ContextPool {
    free: Mutex<Vec<Box<ContextState>>>,
    capacity: usize,
}

impl ContextPool {
    pub fn new(capacity: usize) -> Self {
        ContextPool {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// O(1): pop the most recently released state, or allocate.
    pub fn acquire(&self) -> Box<ContextState> {
        self.free
            .lock()
            .expect("context pool poisoned")
            .pop()
            .unwrap_or_default()
    }

    /// Reset and return a state. Dropped on the floor once the pool is at
    /// capacity.
    pub fn release(&self, mut state: Box<ContextState>) {
        state.reset();
        let mut free = self.free.lock().expect("context pool poisoned");
        if free.len() < self.capacity {
            free.push(state);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().expect("context pool poisoned").len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_reuses_most_recent_release() {
        let pool = ContextPool::new(10);

        let mut a = pool.acquire();
        a.params.push(("id".into(), "1".into()));
        let marker = a.as_ref() as *const ContextState;
        pool.release(a);
        assert_eq!(pool.idle(), 1);

        // LIFO: the slot we just released comes back first.
        let b = pool.acquire();
        assert_eq!(b.as_ref() as *const ContextState, marker);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_release_resets_state() {
        let pool = ContextPool::new(10);

        let mut state = pool.acquire();
        state.params.push(("id".into(), "42".into()));
        state.skip_view = true;
        pool.release(state);

        let reacquired = pool.acquire();
        assert!(reacquired.params.is_empty());
        assert!(!reacquired.skip_view);
    }

    #[test]
    fn test_pool_respects_capacity() {
        let pool = ContextPool::new(2);
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.idle(), 2);
    }
}
