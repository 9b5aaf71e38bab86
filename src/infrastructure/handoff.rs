//! Rendezvous Channel
//!
//! A zero-capacity hand-off between callers and a single worker task. The
//! worker offers a one-shot slot only while it is parked in
//! [`HandoffReceiver::recv`]; a sender can deliver only into such a slot.
//! Nothing is ever queued, so a `send` that is dropped before the hand-off
//! (a timeout, a lost `select!` branch) leaves no trace.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Notify};

/// The receiving worker has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("receiving worker has stopped")]
pub struct HandoffError;

struct State<T> {
    /// Slot offered by a parked receiver.
    slot: Option<oneshot::Sender<T>>,
    senders: usize,
    receiver_gone: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Signalled whenever a slot is offered or the receiver goes away.
    ready: Notify,
}

impl<T> Shared<T> {
    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sending half of a rendezvous channel.
pub struct HandoffSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        self.shared.state().senders += 1;
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for HandoffSender<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        state.senders -= 1;
        if state.senders == 0 {
            // Wakes a parked receiver with `None`.
            state.slot = None;
        }
    }
}

/// Receiving half of a rendezvous channel.
pub struct HandoffReceiver<T> {
    shared: Arc<Shared<T>>,
    /// Delivered into a slot the receiver was withdrawing.
    stash: Option<T>,
}

impl<T> Drop for HandoffReceiver<T> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state();
            state.receiver_gone = true;
            state.slot = None;
        }
        self.shared.ready.notify_waiters();
    }
}

/// Create a rendezvous channel.
pub fn channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            slot: None,
            senders: 1,
            receiver_gone: false,
        }),
        ready: Notify::new(),
    });
    (
        HandoffSender {
            shared: shared.clone(),
        },
        HandoffReceiver {
            shared,
            stash: None,
        },
    )
}

impl<T> HandoffSender<T> {
    /// Hand `value` to the worker, waiting until it is parked in `recv`.
    ///
    /// Fails once the receiver is dropped. Cancel safe: if this future is
    /// dropped before it resolves, the worker never sees `value`.
    pub async fn send(&self, value: T) -> Result<(), HandoffError> {
        let mut value = value;
        loop {
            let ready = self.shared.ready.notified();

            let slot = {
                let mut state = self.shared.state();
                if state.receiver_gone {
                    return Err(HandoffError);
                }
                state.slot.take()
            };

            match slot {
                Some(slot) => match slot.send(value) {
                    Ok(()) => return Ok(()),
                    // The receiver withdrew the slot; wait for the next one.
                    Err(returned) => value = returned,
                },
                None => ready.await,
            }
        }
    }

    /// Whether the receiving worker is gone.
    pub fn is_closed(&self) -> bool {
        self.shared.state().receiver_gone
    }
}

impl<T> HandoffReceiver<T> {
    /// Take the next value.
    ///
    /// Returns `None` once every sender is dropped. Cancel safe: dropping the
    /// future withdraws the slot, and a value that raced the withdrawal is
    /// returned by the next call.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(value) = self.stash.take() {
            return Some(value);
        }

        let rx = {
            let mut state = self.shared.state();
            if state.senders == 0 {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            state.slot = Some(tx);
            rx
        };
        self.shared.ready.notify_waiters();

        let mut offer = Offer {
            shared: &self.shared,
            stash: &mut self.stash,
            rx: Some(rx),
        };
        offer.take().await
    }
}

/// A slot on offer; withdrawn again when dropped unfilled.
struct Offer<'a, T> {
    shared: &'a Shared<T>,
    stash: &'a mut Option<T>,
    rx: Option<oneshot::Receiver<T>>,
}

impl<T> Offer<'_, T> {
    async fn take(&mut self) -> Option<T> {
        let rx = self.rx.as_mut()?;
        let value = rx.await.ok();
        self.rx = None;
        value
    }
}

impl<T> Drop for Offer<'_, T> {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        self.shared.state().slot = None;
        rx.close();
        if let Ok(value) = rx.try_recv() {
            *self.stash = Some(value);
        }
    }
}
