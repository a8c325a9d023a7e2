//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Generic rendezvous collection matching arriving items to waiting consumers.
//!
//! A [`Rendezvous`] pairs items pushed by a producer with consumers that have
//! registered interest, or buffers items in arrival order until a consumer
//! shows up. Consumers express interest with a [`Verdict`]-returning closure,
//! which lets one collection type serve two different handoff styles in the
//! server:
//!
//! - one-shot delivery (new-instance notifications): every waiter claims the
//!   first item it sees;
//! - repeatable stream handoff (per-instance stream queues): waiters can skip
//!   items they are not interested in, or discard broken ones and keep
//!   waiting.
//!
//! # Ordering
//!
//! Waiters are satisfied in first-registered order when several could accept
//! the same item; buffered items are offered in insertion order. Ownership of
//! an item transfers exactly once, under the collection's lock: either to the
//! waiter that claims it or back into the buffer if the waiter gives up
//! before consuming it.
//!
//! # Cancellation
//!
//! Dropping a [`Wait`] future deregisters the waiter. If the waiter was
//! settled concurrently with an item, the item is returned to the buffer
//! rather than lost, so a racing timeout can never leak a resource-owning
//! item.
//!
//! # Example
//!
//! ```rust
//! use revipc::rendezvous::{Rendezvous, Verdict};
//!
//! # async fn example() {
//! let collection = Rendezvous::new();
//!
//! // No waiter yet: the item is buffered.
//! collection.add("first".to_string()).unwrap();
//!
//! // The waiter claims the buffered item immediately.
//! let item = collection.wait(|_: &String| Verdict::Claim).await.unwrap();
//! assert_eq!(item, "first");
//! # }
//! ```

mod error;

pub use error::RendezvousError;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Decision a waiter makes about an offered item.
///
/// Returned by the closure passed to [`Rendezvous::wait`] each time an item
/// is offered to the waiter, either during the initial scan of the buffer or
/// later when a producer calls [`Rendezvous::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Not interested in this item; offer it to the next waiter or leave it
    /// in the buffer.
    Skip,
    /// Settle the waiter with this item and remove it from the collection.
    Claim,
    /// Remove and drop the item, and keep waiting for the next one.
    ///
    /// Dropping closes resource-owning items; this is what drives the
    /// dead-stream retry loop without a second collection type.
    Discard,
}

/// A registered consumer: its verdict closure and its settlement channel.
///
/// Settled at most once; disposal settles by dropping the sender, which the
/// receiving [`Wait`] future reports as [`RendezvousError::Disposed`].
struct Waiter<T> {
    id: u64,
    verdict: Box<dyn FnMut(&T) -> Verdict + Send>,
    tx: oneshot::Sender<T>,
}

struct Store<T> {
    items: VecDeque<T>,
    waiters: VecDeque<Waiter<T>>,
    next_waiter: u64,
    disposed: bool,
}

/// A concurrent store that matches arriving items to waiting consumers, or
/// buffers items until a consumer arrives.
///
/// See the [module documentation](self) for the full contract. All mutation
/// happens under a single internal lock; verdict closures run under that lock
/// and must not block.
///
/// # Examples
///
/// ```rust
/// use revipc::rendezvous::{Rendezvous, Verdict};
///
/// # async fn example() {
/// let collection: Rendezvous<u32> = Rendezvous::new();
///
/// collection.add(1).unwrap();
/// collection.add(2).unwrap();
///
/// // Items are matched in insertion order.
/// let first = collection.wait(|_| Verdict::Claim).await.unwrap();
/// assert_eq!(first, 1);
///
/// // A verdict closure can filter.
/// let two = collection
///     .wait(|n: &u32| if *n == 2 { Verdict::Claim } else { Verdict::Skip })
///     .await
///     .unwrap();
/// assert_eq!(two, 2);
/// # }
/// ```
pub struct Rendezvous<T> {
    store: Mutex<Store<T>>,
}

impl<T> Rendezvous<T>
where
    T: Send + 'static,
{
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store {
                items: VecDeque::new(),
                waiters: VecDeque::new(),
                next_waiter: 0,
                disposed: false,
            }),
        }
    }

    /// Adds an item, settling the oldest waiter that accepts it.
    ///
    /// The item is offered to every registered waiter in first-registered
    /// order. A waiter that returns [`Verdict::Claim`] is settled with the
    /// item; one that returns [`Verdict::Discard`] drops the item and keeps
    /// waiting. If no waiter consumes the item, it is buffered at the tail.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Disposed`] after [`dispose`](Self::dispose);
    /// the rejected item is dropped.
    pub fn add(&self, item: T) -> Result<(), RendezvousError> {
        let mut store = self.store.lock();
        if store.disposed {
            drop(store);
            drop(item);
            return Err(RendezvousError::Disposed);
        }
        if let Some(item) = offer_locked(&mut store, item) {
            store.items.push_back(item);
        }
        Ok(())
    }

    /// Atomically displaces every buffered item, then adds `item`.
    ///
    /// Used for last-writer-wins replacement: a newly arrived stream for an
    /// identity supersedes any stream still sitting unconsumed in the buffer.
    /// The displaced items are returned so the caller can close them outside
    /// the lock; they are never offered to waiters again.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Disposed`] after disposal; the rejected
    /// item is dropped.
    pub fn supersede(&self, item: T) -> Result<Vec<T>, RendezvousError> {
        let mut store = self.store.lock();
        if store.disposed {
            drop(store);
            drop(item);
            return Err(RendezvousError::Disposed);
        }
        let displaced: Vec<T> = store.items.drain(..).collect();
        if let Some(item) = offer_locked(&mut store, item) {
            store.items.push_back(item);
        }
        drop(store);
        Ok(displaced)
    }

    /// Adds `item` only if the buffer is empty.
    ///
    /// This is the give-back half of a take/probe/restore cycle: a consumer
    /// that claimed an item to inspect it outside the lock can return it,
    /// unless a newer item arrived in the meantime, in which case the stale
    /// item is handed back to the caller (`Ok(Some(item))`) to be closed.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Disposed`] after disposal; the rejected
    /// item is dropped.
    pub fn restore(&self, item: T) -> Result<Option<T>, RendezvousError> {
        let mut store = self.store.lock();
        if store.disposed {
            drop(store);
            drop(item);
            return Err(RendezvousError::Disposed);
        }
        if !store.items.is_empty() {
            return Ok(Some(item));
        }
        if let Some(item) = offer_locked(&mut store, item) {
            store.items.push_back(item);
        }
        Ok(None)
    }

    /// Waits for an item accepted by `verdict`.
    ///
    /// Buffered items are scanned in insertion order first; if one is
    /// claimed, the future resolves on its first poll without suspending.
    /// Otherwise the waiter is registered and the future suspends until a
    /// producer [`add`](Self::add)s an accepted item or the collection is
    /// disposed.
    ///
    /// Dropping the returned future deregisters the waiter; an item that was
    /// delivered concurrently is returned to the buffer.
    ///
    /// # Errors
    ///
    /// The future resolves to [`RendezvousError::Disposed`] if the collection
    /// is disposed before or while waiting.
    pub fn wait<F>(&self, verdict: F) -> Wait<'_, T>
    where
        F: FnMut(&T) -> Verdict + Send + 'static,
    {
        let mut verdict = verdict;
        let mut store = self.store.lock();
        if store.disposed {
            return Wait {
                rendezvous: self,
                state: WaitState::Ready(Some(Err(RendezvousError::Disposed))),
            };
        }

        let mut index = 0;
        while index < store.items.len() {
            match verdict(&store.items[index]) {
                Verdict::Skip => index += 1,
                Verdict::Claim => {
                    if let Some(item) = store.items.remove(index) {
                        return Wait {
                            rendezvous: self,
                            state: WaitState::Ready(Some(Ok(item))),
                        };
                    }
                    index += 1;
                }
                Verdict::Discard => {
                    drop(store.items.remove(index));
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        let id = store.next_waiter;
        store.next_waiter += 1;
        store.waiters.push_back(Waiter {
            id,
            verdict: Box::new(verdict),
            tx,
        });

        Wait {
            rendezvous: self,
            state: WaitState::Pending {
                id,
                rx,
                settled: false,
            },
        }
    }

    /// Waits for an accepted item, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Timeout`] if the bound elapses first; the
    /// waiter registration is removed, and an item delivered in the final
    /// race window goes back to the buffer instead of being lost.
    pub async fn wait_timeout<F>(&self, verdict: F, timeout: Duration) -> Result<T, RendezvousError>
    where
        F: FnMut(&T) -> Verdict + Send + 'static,
    {
        match tokio::time::timeout(timeout, self.wait(verdict)).await {
            Ok(result) => result,
            Err(_) => Err(RendezvousError::Timeout { duration: timeout }),
        }
    }

    /// Waits for an accepted item until the caller's token fires.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Cancelled`] when `cancel` fires first,
    /// never a timeout or disposal error, so the outcome is attributable to
    /// the caller's own signal.
    pub async fn wait_cancellable<F>(
        &self,
        verdict: F,
        cancel: &CancellationToken,
    ) -> Result<T, RendezvousError>
    where
        F: FnMut(&T) -> Verdict + Send + 'static,
    {
        tokio::select! {
            biased;
            result = self.wait(verdict) => result,
            () = cancel.cancelled() => Err(RendezvousError::Cancelled),
        }
    }

    /// Removes and returns the first buffered item matching `predicate`,
    /// without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Disposed`] after disposal.
    pub fn remove<P>(&self, mut predicate: P) -> Result<Option<T>, RendezvousError>
    where
        P: FnMut(&T) -> bool,
    {
        let mut store = self.store.lock();
        if store.disposed {
            return Err(RendezvousError::Disposed);
        }
        let position = store.items.iter().position(|item| predicate(item));
        Ok(position.and_then(|index| store.items.remove(index)))
    }

    /// Returns a copy of the buffered items.
    ///
    /// The internal store is never exposed; iteration is over a snapshot so
    /// concurrent mutation cannot invalidate it.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Disposed`] after disposal.
    pub fn snapshot(&self) -> Result<Vec<T>, RendezvousError>
    where
        T: Clone,
    {
        let store = self.store.lock();
        if store.disposed {
            return Err(RendezvousError::Disposed);
        }
        Ok(store.items.iter().cloned().collect())
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().items.len()
    }

    /// Returns `true` if no items are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().items.is_empty()
    }

    /// Disposes the collection.
    ///
    /// Every pending waiter is settled with [`RendezvousError::Disposed`],
    /// every buffered item is dropped (closing resource-owning items), and
    /// all future operations fail with the same error. Idempotent.
    pub fn dispose(&self) {
        let (items, waiters) = {
            let mut store = self.store.lock();
            if store.disposed {
                return;
            }
            store.disposed = true;
            let items: Vec<T> = store.items.drain(..).collect();
            let waiters: Vec<Waiter<T>> = store.waiters.drain(..).collect();
            (items, waiters)
        };
        // Dropping each waiter's sender settles its receiver with Disposed.
        drop(waiters);
        drop(items);
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.store.lock().disposed
    }
}

/// Offers `item` to registered waiters in first-registered order.
///
/// Returns the item back if no waiter consumed it. Waiters whose receivers
/// are gone (the wait future was dropped between its deregistration and
/// this scan) are pruned without seeing the item.
fn offer_locked<T>(store: &mut Store<T>, item: T) -> Option<T> {
    let mut item = item;
    let mut index = 0;
    while index < store.waiters.len() {
        if store.waiters[index].tx.is_closed() {
            store.waiters.remove(index);
            continue;
        }
        match (store.waiters[index].verdict)(&item) {
            Verdict::Skip => index += 1,
            Verdict::Claim => {
                let Some(waiter) = store.waiters.remove(index) else {
                    continue;
                };
                match waiter.tx.send(item) {
                    Ok(()) => return None,
                    // Receiver disappeared after the is_closed check;
                    // take the item back and keep offering.
                    Err(returned) => item = returned,
                }
            }
            Verdict::Discard => {
                drop(item);
                return None;
            }
        }
    }
    Some(item)
}

impl<T> Default for Rendezvous<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Rendezvous<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.lock();
        f.debug_struct("Rendezvous")
            .field("items", &store.items.len())
            .field("waiters", &store.waiters.len())
            .field("disposed", &store.disposed)
            .finish()
    }
}

enum WaitState<T> {
    /// Resolved at registration time: a claimed item, a disposal error, or
    /// `None` once the result has been taken by `poll`.
    Ready(Option<Result<T, RendezvousError>>),
    Pending {
        id: u64,
        rx: oneshot::Receiver<T>,
        settled: bool,
    },
}

/// Future returned by [`Rendezvous::wait`].
///
/// Dropping an unresolved `Wait` removes its registration from the
/// collection under the collection lock; an item that was already delivered
/// to the waiter is put back into the buffer.
#[must_use = "futures do nothing unless polled"]
pub struct Wait<'a, T> {
    rendezvous: &'a Rendezvous<T>,
    state: WaitState<T>,
}

// No field of `Wait` is structurally pinned: the `Ready` slot is only moved
// out via `take`, and the `oneshot::Receiver` in `Pending` is itself `Unpin`
// and polled through a fresh `Pin::new`. `Wait` is therefore `Unpin` for any
// `T`, which lets `poll` project `&mut Self` without requiring `T: Unpin`.
impl<T> Unpin for Wait<'_, T> {}

impl<T> Future for Wait<'_, T>
where
    T: Send + 'static,
{
    type Output = Result<T, RendezvousError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            WaitState::Ready(slot) => match slot.take() {
                Some(result) => Poll::Ready(result),
                None => panic!("Wait polled after completion"),
            },
            WaitState::Pending { rx, settled, .. } => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(item)) => {
                    *settled = true;
                    Poll::Ready(Ok(item))
                }
                // Sender dropped: only disposal drops senders of live waiters.
                Poll::Ready(Err(_)) => {
                    *settled = true;
                    Poll::Ready(Err(RendezvousError::Disposed))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<T> Drop for Wait<'_, T> {
    fn drop(&mut self) {
        let WaitState::Pending { id, rx, settled } = &mut self.state else {
            return;
        };
        if *settled {
            return;
        }
        let mut store = self.rendezvous.store.lock();
        if let Some(position) = store.waiters.iter().position(|waiter| waiter.id == *id) {
            // Never settled: plain deregistration.
            store.waiters.remove(position);
        } else if let Ok(item) = rx.try_recv() {
            // Settled concurrently with this drop. Hand the item back under
            // the same lock so it is neither lost nor double-owned.
            if store.disposed {
                drop(store);
                drop(item);
            } else if let Some(item) = offer_locked(&mut store, item) {
                store.items.push_back(item);
            }
        }
    }
}
