//! Output channel: MPSC transport from workers to the puller with yield
//! accounting against the buffer cap.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use std::time::Duration;

use crate::utils::config::SPACE_WAIT;

/// One message from a worker to the puller.
pub(crate) enum Cell<T> {
    Yield(T),
    Stop {
        worker: usize,
        failure: Option<crate::Error>,
    },
}

/// Capacity is enforced through `buffered`, not the transport: a yield is
/// admitted only after reserving a slot, so the count never exceeds the cap.
/// Stop cells bypass the cap so a worker can always report its exit.
pub(crate) struct OutputChannel<T> {
    tx: Sender<Cell<T>>,
    rx: Receiver<Cell<T>>,
    buffered: AtomicUsize,
    cap: Option<usize>,
    space_lock: Mutex<()>,
    space: Condvar,
}

impl<T: Send> OutputChannel<T> {
    pub fn new(cap: Option<usize>) -> Self {
        let (tx, rx) = unbounded();
        OutputChannel {
            tx,
            rx,
            buffered: AtomicUsize::new(0),
            cap,
            space_lock: Mutex::new(()),
            space: Condvar::new(),
        }
    }

    fn reserve(&self) -> bool {
        let Some(cap) = self.cap else {
            self.buffered.fetch_add(1, SeqCst);
            return true;
        };
        let mut seen = self.buffered.load(SeqCst);
        loop {
            if seen >= cap {
                return false;
            }
            match self.buffered.compare_exchange(seen, seen + 1, SeqCst, SeqCst) {
                Ok(_) => return true,
                Err(cur) => seen = cur,
            }
        }
    }

    /// Admit one yield if the buffer has room; hands the value back when it
    /// does not. A full buffer is the "do not continue" signal to workers.
    pub fn try_push(&self, v: T) -> Result<(), T> {
        if !self.reserve() {
            return Err(v);
        }
        let _ = self.tx.send(Cell::Yield(v));
        Ok(())
    }

    /// Blocking push: wait on the space gate until a slot frees up.
    /// Hands the value back when `stopped` flips while waiting.
    pub fn push_wait(&self, v: T, stopped: &AtomicBool) -> Result<(), T> {
        loop {
            if stopped.load(SeqCst) {
                return Err(v);
            }
            if self.reserve() {
                let _ = self.tx.send(Cell::Yield(v));
                return Ok(());
            }
            let mut guard = self.space_lock.lock();
            if !self.is_full() || stopped.load(SeqCst) {
                continue;
            }
            self.space.wait_for(&mut guard, SPACE_WAIT);
        }
    }

    pub fn send_stop(&self, worker: usize, failure: Option<crate::Error>) {
        let _ = self.tx.send(Cell::Stop { worker, failure });
    }

    /// Block for at most `timeout`, then take the whole backlog in one
    /// acquisition. An empty vec means the timeout expired.
    pub fn recv_batch(&self, timeout: Duration) -> Vec<Cell<T>> {
        let mut batch = Vec::new();
        match self.rx.recv_timeout(timeout) {
            Ok(cell) => batch.push(cell),
            Err(_) => return batch,
        }
        batch.extend(self.rx.try_iter());
        batch
    }

    /// Account yields the puller took out of the buffer and wake any
    /// producer parked on the space gate.
    pub fn note_drained(&self, yields: usize) {
        if yields == 0 {
            return;
        }
        self.buffered.fetch_sub(yields, SeqCst);
        self.notify_space();
    }

    pub fn notify_space(&self) {
        let _guard = self.space_lock.lock();
        self.space.notify_all();
    }

    pub fn is_full(&self) -> bool {
        self.cap.is_some_and(|cap| self.buffered.load(SeqCst) >= cap)
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn buffered(&self) -> usize {
        self.buffered.load(SeqCst)
    }
}
