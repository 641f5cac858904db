//! Bounded pool of reusable connections to a single remote endpoint

use crate::error::{CloseFailure, PoolError, Result};
use crate::factory::ConnectionFactory;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Internal pool state, guarded by a single lock
struct PoolState<C> {
    /// Slot `i` keeps the connection dialed for index `i`, once filled,
    /// for the pool's lifetime. A slot never reverts to empty while the
    /// pool is open.
    slots: Vec<Option<Arc<AsyncMutex<C>>>>,
    /// Indices not currently leased. Low indices are handed out first so
    /// slots fill in order.
    free: Vec<usize>,
    leased: usize,
    closed: bool,
}

/// A fixed-capacity pool of lazily dialed connections
///
/// The pool owns `capacity` slots, each holding at most one connection for
/// the pool's lifetime. [`get`](ConnectionPool::get) leases a free slot,
/// dialing it through the factory on first use; dropping the returned
/// [`PooledConn`] releases the slot. The pool never blocks waiting for a
/// free slot: when all slots are leased, `get` fails immediately with
/// [`PoolError::Exhausted`] and callers implement their own retry/backoff.
///
/// Connections are reused as-is across leases with no health checking; a
/// connection the peer has dropped surfaces as an I/O error to the next
/// holder. All connections are shut down once, at
/// [`close`](ConnectionPool::close).
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    capacity: usize,
    state: Arc<Mutex<PoolState<F::Connection>>>,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool with the given capacity and connection factory
    ///
    /// No connections are dialed eagerly; each slot is filled the first
    /// time a lease reaches it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize, factory: F) -> Result<Self> {
        if capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }

        Ok(Self {
            factory,
            capacity,
            state: Arc::new(Mutex::new(PoolState {
                slots: (0..capacity).map(|_| None).collect(),
                free: (0..capacity).rev().collect(),
                leased: 0,
                closed: false,
            })),
        })
    }

    /// The fixed capacity set at construction
    #[must_use]
    pub fn size(&self) -> usize {
        self.capacity
    }

    /// Number of connections currently leased
    #[must_use]
    pub fn active(&self) -> usize {
        self.state.lock().leased
    }

    /// Lease a connection from the pool
    ///
    /// Pops a free slot index, dialing the slot's connection through the
    /// factory if it has never been filled. The dial happens with the pool
    /// lock released; the reserved index is invisible to concurrent calls,
    /// so a slot being filled is only ever dialed once and other leases
    /// are not stalled behind a slow dial.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Exhausted`] when every slot is leased. Returned
    ///   immediately; the pool never parks waiting for a release.
    /// - [`PoolError::Closed`] after [`close`](ConnectionPool::close).
    /// - [`PoolError::Dial`] / [`PoolError::Tls`] when the factory fails;
    ///   the slot stays empty and is retried by a future lease.
    pub async fn get(&self) -> Result<PooledConn<F::Connection>> {
        let (index, existing) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            let index = state
                .free
                .pop()
                .ok_or(PoolError::Exhausted(self.capacity))?;
            state.leased += 1;
            (index, state.slots[index].clone())
        };

        let shared = match existing {
            Some(shared) => shared,
            None => match self.factory.connect().await {
                Ok(conn) => {
                    tracing::debug!(slot = index, "filled pool slot with new connection");
                    let shared = Arc::new(AsyncMutex::new(conn));
                    let mut state = self.state.lock();
                    if state.closed {
                        // Raced with close(); the fresh connection is
                        // abandoned and torn down on drop.
                        state.leased -= 1;
                        return Err(PoolError::Closed);
                    }
                    state.slots[index] = Some(Arc::clone(&shared));
                    shared
                }
                Err(e) => {
                    tracing::debug!(slot = index, error = %e, "dial failed, returning slot");
                    let mut state = self.state.lock();
                    state.leased -= 1;
                    if !state.closed {
                        state.free.push(index);
                    }
                    return Err(e);
                }
            },
        };

        // The index was reserved above, so the slot mutex is uncontended
        // unless close() raced in and shut the connection down.
        let conn = shared.lock_owned().await;
        {
            let mut state = self.state.lock();
            if state.closed {
                // close() won the race after the reserve; give the
                // reservation back so the count stays accurate.
                state.leased -= 1;
                return Err(PoolError::Closed);
            }
        }

        Ok(PooledConn {
            conn: Some(conn),
            index,
            state: Arc::clone(&self.state),
        })
    }

    /// Close the pool, shutting down every filled slot
    ///
    /// Closing is one-way: subsequent leases fail with
    /// [`PoolError::Closed`]. Every filled slot is attempted; failures are
    /// collected rather than aborting on the first one. A connection still
    /// leased at close time is reported as a failure for its slot and is
    /// torn down non-gracefully when its guard drops.
    ///
    /// Calling `close` on an already closed pool is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Close`] aggregating every slot that could not
    /// be shut down cleanly.
    pub async fn close(&self) -> Result<()> {
        let drained = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.free.clear();

            let mut drained = Vec::new();
            for (index, slot) in state.slots.iter_mut().enumerate() {
                if let Some(shared) = slot.take() {
                    drained.push((index, shared));
                }
            }
            drained
        };

        let mut failures = Vec::new();
        for (slot, shared) in drained {
            match shared.try_lock_owned() {
                Ok(mut conn) => {
                    if let Err(source) = conn.shutdown().await {
                        failures.push(CloseFailure { slot, source });
                    }
                }
                Err(_) => {
                    failures.push(CloseFailure {
                        slot,
                        source: io::Error::new(
                            io::ErrorKind::WouldBlock,
                            "connection still leased at close",
                        ),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            tracing::warn!(
                failed = failures.len(),
                "pool close could not shut down every connection"
            );
            Err(PoolError::Close(failures))
        }
    }
}

impl<F: ConnectionFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        let state = self.state.lock();
        let filled = state.slots.iter().filter(|slot| slot.is_some()).count();
        if !state.closed && filled > 0 {
            tracing::warn!(
                connections = filled,
                "ConnectionPool dropped with open connections; call close() for a graceful shutdown"
            );
        }
    }
}

/// RAII lease over a pooled connection
///
/// Dereferences to the underlying stream for reads and writes. Dropping
/// the guard releases the slot back to the pool; the connection itself
/// stays in its slot for reuse by the next lease. Holders must not shut
/// the stream down directly, that is the pool's job at close.
///
/// Because release is tied to this guard, releasing twice or releasing a
/// connection the pool never produced is unrepresentable.
pub struct PooledConn<C> {
    conn: Option<OwnedMutexGuard<C>>,
    index: usize,
    state: Arc<Mutex<PoolState<C>>>,
}

impl<C> PooledConn<C> {
    /// Index of the slot this lease occupies
    #[must_use]
    pub fn slot(&self) -> usize {
        self.index
    }
}

impl<C> std::ops::Deref for PooledConn<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        // Invariant: conn is Some from get() until Drop takes it
        self.conn
            .as_ref()
            .expect("PooledConn invariant violated: connection is None before Drop")
    }
}

impl<C> std::ops::DerefMut for PooledConn<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("PooledConn invariant violated: connection is None before Drop")
    }
}

impl<C> AsRef<C> for PooledConn<C> {
    fn as_ref(&self) -> &C {
        self
    }
}

impl<C> AsMut<C> for PooledConn<C> {
    fn as_mut(&mut self) -> &mut C {
        self
    }
}

impl<C> Drop for PooledConn<C> {
    fn drop(&mut self) {
        // Unlock the slot before touching pool state
        drop(self.conn.take());

        let mut state = self.state.lock();
        state.leased = state.leased.saturating_sub(1);
        if !state.closed {
            state.free.push(self.index);
        }
        // After close() the slot is gone; the connection was (or will be)
        // torn down and the index must not be recycled.
    }
}
