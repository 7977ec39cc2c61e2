use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, Duration},
};

// A slot that can be settled exactly once
// Clones share the slot, so an operation and its timer can each hold one and
// race for it; whoever settles second is told so and their value is dropped
pub struct SettleOnce<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for SettleOnce<T> {
    fn clone(&self) -> Self {
        Self { slot: self.slot.clone() }
    }
}

// Receiving half of a SettleOnce
pub struct Settlement<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> SettleOnce<T> {
    pub fn new() -> (Self, Settlement<T>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self { slot: Arc::new(Mutex::new(Some(sender))) },
            Settlement { receiver },
        )
    }

    // Returns false if the slot was already settled
    pub fn settle(&self, value: T) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            // A panic while holding the lock can only have happened around `take`
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            // The receiver may be gone if the waiter was dropped, the slot still counts as settled
            Some(sender) => {
                let _ = sender.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        match self.slot.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl<T> Settlement<T> {
    // None when every settler was dropped without settling
    pub async fn wait(self) -> Option<T> {
        self.receiver.await.ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T> {
    Completed(T),
    TimedOut,
}

// Aborts the wrapped task when dropped, so a caller that gives up on the race
// does not leave the operation or its timer running
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// Run `operation` against a deadline
// Both sides race for one SettleOnce. The side that loses is aborted, which for a
// network request is advisory only: the request may still reach the endpoint.
// Dropping this future aborts both sides as well
pub async fn race_deadline<T>(limit: Duration, operation: BoxFuture<'static, T>) -> Settled<T>
where
    T: Send + 'static,
{
    let (settler, settlement) = SettleOnce::new();

    let op_settler = settler.clone();
    let _op_task = AbortOnDrop(tokio::spawn(async move {
        let value = operation.await;
        if !op_settler.settle(Settled::Completed(value)) {
            log::debug!("Operation finished after its deadline, result discarded");
        }
    }));

    let timer_settler = settler;
    let _timer_task = AbortOnDrop(tokio::spawn(async move {
        sleep(limit).await;
        if timer_settler.settle(Settled::TimedOut) {
            log::debug!("Deadline of {:?} reached before the operation settled", limit);
        }
    }));

    // Both settlers gone without a value means both tasks died, treat it like the deadline
    settlement.wait().await.unwrap_or(Settled::TimedOut)
}
