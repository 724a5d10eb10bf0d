//! Session and adapter state machines
//!
//! All lifecycle decisions in the engine reduce to one primitive: an atomic
//! compare-and-set on a [`StateContainer`]. Components never read a state and
//! then write it in two steps; they call [`StateContainer::transition`] and
//! branch on its verdict, which is what keeps concurrent callbacks, timers
//! and caller requests from double-starting or double-stopping anything.
//!
//! For multi-step sequences (check state, mutate a map, notify a callback)
//! a component takes the compound [`StateGuard`] instead, and any secondary
//! lock it needs is a [`Guarded`] whose `lock()` demands the held state guard
//! as proof. Acquiring the locks in the wrong order does not compile.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Session lifecycle states
///
/// `Stopped` is both the initial state and the terminal state until the next
/// start. `Starting` is left either by the first accepted fused datum or by
/// any stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Stopped,
    Starting,
    Started,
}

impl SessionState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    /// True while the session accepts adapter and fusion events
    pub fn is_live(&self) -> bool {
        !self.is_stopped()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Stopped => "stopped",
            SessionState::Starting => "starting",
            SessionState::Started => "started",
        };
        write!(f, "{}", s)
    }
}

/// Per-adapter lifecycle states, a strictly sequential cycle
///
/// Stopped -> Starting -> Started -> Stopping -> Stopped. No transition may
/// skip a step; an adapter that fails to start goes back to `Stopped` via an
/// unconditional set, reported through its stopped callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdapterState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl AdapterState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, AdapterState::Stopped)
    }

    /// True while measurements from the driver may be forwarded
    pub fn is_started(&self) -> bool {
        matches!(self, AdapterState::Started)
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdapterState::Stopped => "stopped",
            AdapterState::Starting => "starting",
            AdapterState::Started => "started",
            AdapterState::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// Lock-protected state holder with atomic compare-and-set
pub struct StateContainer<S> {
    inner: Mutex<S>,
}

impl<S: Copy + PartialEq> StateContainer<S> {
    pub fn new(initial: S) -> Self {
        StateContainer {
            inner: Mutex::new(initial),
        }
    }

    /// Current state
    pub fn get(&self) -> S {
        *self.inner.lock().unwrap()
    }

    /// Unconditional overwrite
    pub fn set(&self, next: S) {
        *self.inner.lock().unwrap() = next;
    }

    /// Atomic compare-and-set: succeed only when the current state is `from`.
    ///
    /// On failure the state is left untouched and the caller decides what a
    /// refused transition means (usually a logged no-op).
    pub fn transition(&self, from: S, to: S) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if *guard == from {
            *guard = to;
            true
        } else {
            false
        }
    }

    /// Hold the state lock across a compound critical section.
    ///
    /// Everything done through the returned guard is atomic with respect to
    /// every other `get`/`set`/`transition`/`lock` caller.
    pub fn lock(&self) -> StateGuard<'_, S> {
        StateGuard {
            guard: self.inner.lock().unwrap(),
        }
    }
}

impl<S: Copy + PartialEq + Default> Default for StateContainer<S> {
    fn default() -> Self {
        StateContainer::new(S::default())
    }
}

/// Held state lock for a compound critical section
pub struct StateGuard<'a, S> {
    guard: MutexGuard<'a, S>,
}

impl<S: Copy + PartialEq> StateGuard<'_, S> {
    pub fn get(&self) -> S {
        *self.guard
    }

    pub fn set(&mut self, next: S) {
        *self.guard = next;
    }

    pub fn transition(&mut self, from: S, to: S) -> bool {
        if *self.guard == from {
            *self.guard = to;
            true
        } else {
            false
        }
    }
}

/// A secondary lock that can only be taken while the state lock is held
///
/// `lock()` takes the held [`StateGuard`] as proof, so the state-before-
/// secondary acquisition order is checked by the compiler rather than by
/// convention. For reads that must not wait on state-lock holders there is
/// [`Guarded::with`], which scopes the guard to a closure so it cannot be
/// held across a later state-lock acquisition.
pub struct Guarded<T> {
    inner: Mutex<T>,
}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Guarded {
            inner: Mutex::new(value),
        }
    }

    /// Lock under a held state guard.
    ///
    /// The returned guard borrows the state guard, so the state lock stays
    /// held for at least as long as this lock.
    pub fn lock<'a, 'g, S>(&'a self, _state: &'a StateGuard<'g, S>) -> MutexGuard<'a, T> {
        self.inner.lock().unwrap()
    }

    /// Closure-scoped access without the state lock, for live queries.
    ///
    /// The closure must not touch any state lock; keeping the guard inside
    /// the closure makes holding it across one impossible at the call site.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }
}

impl<T: Default> Default for Guarded<T> {
    fn default() -> Self {
        Guarded::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_session_state_transitions() {
        let state = StateContainer::new(SessionState::Stopped);
        assert_eq!(state.get(), SessionState::Stopped);

        assert!(state.transition(SessionState::Stopped, SessionState::Starting));
        assert_eq!(state.get(), SessionState::Starting);

        assert!(state.transition(SessionState::Starting, SessionState::Started));
        assert!(state.get().is_live());

        // Wrong precondition: refused, state untouched
        assert!(!state.transition(SessionState::Starting, SessionState::Started));
        assert_eq!(state.get(), SessionState::Started);
    }

    #[test]
    fn test_set_is_unconditional() {
        let state = StateContainer::new(SessionState::Started);
        state.set(SessionState::Stopped);
        assert!(state.get().is_stopped());
    }

    #[test]
    fn test_adapter_cycle() {
        let state = StateContainer::new(AdapterState::Stopped);
        assert!(state.transition(AdapterState::Stopped, AdapterState::Starting));
        assert!(state.transition(AdapterState::Starting, AdapterState::Started));
        assert!(state.get().is_started());
        assert!(state.transition(AdapterState::Started, AdapterState::Stopping));
        assert!(state.transition(AdapterState::Stopping, AdapterState::Stopped));
        assert!(state.get().is_stopped());

        // Stale precondition: refused, state untouched
        assert!(!state.transition(AdapterState::Started, AdapterState::Stopping));
        assert!(state.get().is_stopped());
    }

    #[test]
    fn test_transition_races_have_one_winner() {
        let state = Arc::new(StateContainer::new(SessionState::Stopped));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    state.transition(SessionState::Stopped, SessionState::Starting)
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(state.get(), SessionState::Starting);
    }

    #[test]
    fn test_compound_guard() {
        let state = StateContainer::new(SessionState::Stopped);
        let adapters: Guarded<Vec<u32>> = Guarded::default();

        let mut guard = state.lock();
        assert!(guard.transition(SessionState::Stopped, SessionState::Starting));
        {
            let mut map = adapters.lock(&guard);
            map.push(7);
        }
        guard.set(SessionState::Started);
        drop(guard);

        assert_eq!(state.get(), SessionState::Started);
        assert_eq!(adapters.with(|v| v.len()), 1);
    }
}
