//! Synchronization of type construction.
//!
//! Three mechanisms cooperate:
//!
//! - [`StructuralLock`] serializes the commits of a loader: publishing a stage, recording a
//!   failure, inserting a definition, unloading a module. It is reentrant and only held for the
//!   commit itself, never while metadata is read or a stage is computed.
//! - [`StageSignal`] wakes threads waiting for a stage another thread claimed.
//! - A thread-local construction stack records which `(type, stage)` pairs the current thread is
//!   building. Re-entering a pair already on the stack means the metadata is cyclic (or the caller
//!   only needs the partial node), and the stack depth bounds pathological recursion.

use std::{
    cell::RefCell,
    sync::{Condvar, Mutex},
    thread::{self, ThreadId},
};

use crate::{
    typesystem::{Stage, TypeHandle},
    Error, Result,
};

struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Reentrant loader-wide mutex
pub(crate) struct StructuralLock {
    state: Mutex<LockState>,
    released: Condvar,
}

/// Held while a thread owns the [`StructuralLock`]; releases one level on drop
pub(crate) struct StructuralGuard<'a> {
    lock: &'a StructuralLock,
}

impl StructuralLock {
    pub(crate) fn new() -> Self {
        StructuralLock {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Acquire the lock, or enter it once more if this thread already owns it
    pub(crate) fn enter(&self) -> Result<StructuralGuard<'_>> {
        let me = thread::current().id();
        let mut state = lock!(self.state);
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                Some(_) => {
                    state = self
                        .released
                        .wait(state)
                        .map_err(|_| Error::LockError)?;
                }
            }
        }
        Ok(StructuralGuard { lock: self })
    }

    /// True if the calling thread owns the lock
    #[cfg(test)]
    pub(crate) fn is_held_by_current_thread(&self) -> bool {
        let me = thread::current().id();
        self.state
            .lock()
            .map(|state| state.owner == Some(me))
            .unwrap_or(false)
    }
}

impl Drop for StructuralGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.lock.state.lock() {
            state.depth = state.depth.saturating_sub(1);
            if state.depth == 0 {
                state.owner = None;
                drop(state);
                self.lock.released.notify_all();
            }
        }
    }
}

/// Condition variable signalled whenever a stage is committed or a claim is dropped
pub(crate) struct StageSignal {
    mutex: Mutex<()>,
    changed: Condvar,
}

impl StageSignal {
    pub(crate) fn new() -> Self {
        StageSignal {
            mutex: Mutex::new(()),
            changed: Condvar::new(),
        }
    }

    /// Block while `pending` holds, re-evaluating it after every notification
    pub(crate) fn wait_while(&self, mut pending: impl FnMut() -> bool) -> Result<()> {
        let guard = lock!(self.mutex);
        let _guard = self
            .changed
            .wait_while(guard, |_| pending())
            .map_err(|_| Error::LockError)?;
        Ok(())
    }

    /// Wake every waiter; the state change must happen before this call
    pub(crate) fn notify(&self) -> Result<()> {
        drop(lock!(self.mutex));
        self.changed.notify_all();
        Ok(())
    }
}

thread_local! {
    static CONSTRUCTING: RefCell<Vec<(usize, TypeHandle, Stage)>> = const { RefCell::new(Vec::new()) };
}

/// One entry of the thread-local construction stack; popped on drop
pub(crate) struct ConstructionFrame {
    _private: (),
}

impl ConstructionFrame {
    /// Push `(loader, handle, stage)`
    ///
    /// Returns `Ok(None)` if the pair is already being built on this thread.
    ///
    /// # Errors
    /// Returns [`Error::RecursionLimit`] if the stack already holds `limit` frames
    pub(crate) fn enter(
        loader: usize,
        handle: TypeHandle,
        stage: Stage,
        limit: usize,
    ) -> Result<Option<Self>> {
        CONSTRUCTING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&(loader, handle, stage)) {
                return Ok(None);
            }
            if stack.len() >= limit {
                return Err(Error::RecursionLimit(limit));
            }
            stack.push((loader, handle, stage));
            Ok(Some(ConstructionFrame { _private: () }))
        })
    }

    /// True if this thread is currently building `stage` of `handle`
    pub(crate) fn is_active(loader: usize, handle: TypeHandle, stage: Stage) -> bool {
        CONSTRUCTING.with(|stack| stack.borrow().contains(&(loader, handle, stage)))
    }

    /// Number of frames on this thread, across all loaders
    pub(crate) fn depth() -> usize {
        CONSTRUCTING.with(|stack| stack.borrow().len())
    }
}

impl Drop for ConstructionFrame {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
