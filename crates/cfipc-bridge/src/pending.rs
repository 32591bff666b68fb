//! One outstanding call: the rendezvous between the bus notify closure
//! and the thread blocked in `Client::call`.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cfipc_core::bus::ReplyNotify;
use cfipc_core::error::{BusError, BusResult, CallError};
use cfipc_core::kdebug;

enum Slot {
    Waiting,
    Done(BusResult<String>),
    /// The waiter gave up; a late reply is dropped.
    Abandoned,
}

pub struct PendingCall {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl PendingCall {
    /// A waiting call, shared between the caller and its notifier.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot::Waiting),
            ready: Condvar::new(),
        })
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Closure handed to `BusConnection::call_async`.
    pub fn notifier(self: &Arc<Self>) -> ReplyNotify {
        let pending = Arc::clone(self);
        Box::new(move |result| {
            pending.complete(result);
        })
    }

    /// Store the outcome and wake the waiter. Returns false if the call
    /// was already completed or abandoned.
    pub fn complete(&self, result: BusResult<String>) -> bool {
        let mut slot = self.slot();
        if matches!(&*slot, Slot::Waiting) {
            *slot = Slot::Done(result);
            drop(slot);
            self.ready.notify_one();
            return true;
        }
        if matches!(&*slot, Slot::Abandoned) {
            kdebug!("reply arrived after the caller timed out, dropped");
        }
        false
    }

    /// Block until completed or `timeout` elapses. Consumes the outcome:
    /// afterwards the call counts as abandoned.
    pub fn wait(&self, timeout: Duration) -> Result<String, CallError> {
        let guard = self.slot();
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |s| matches!(s, Slot::Waiting))
            .unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *slot, Slot::Abandoned) {
            Slot::Done(Ok(body)) => Ok(body),
            Slot::Done(Err(BusError::NoReply(_))) => Err(CallError::Timeout(timeout)),
            Slot::Done(Err(e)) => Err(CallError::Transport(e)),
            Slot::Waiting | Slot::Abandoned => Err(CallError::Timeout(timeout)),
        }
    }
}
