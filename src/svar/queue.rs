//! Work queue: pending producer continuations under the style's discipline,
//! with sequence numbers assigned at enqueue.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::stream::Stream;
use crate::types::Style;

/// One scheduled producer and the sequence number it was admitted under.
/// Only the Ahead style reads the sequence number.
pub(crate) struct Work<T> {
    pub seq: u64,
    pub stream: Stream<T>,
}

enum Discipline<T> {
    /// Async: newest first, depth-first traversal.
    Lifo(Vec<Work<T>>),
    /// WAsync, Ahead, Parallel: oldest first.
    Fifo(VecDeque<Work<T>>),
}

struct Inner<T> {
    items: Discipline<T>,
    alloc: u64,
}

pub(crate) struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Send + 'static> WorkQueue<T> {
    pub fn new(style: Style) -> Self {
        let items = match style {
            Style::Async => Discipline::Lifo(Vec::new()),
            _ => Discipline::Fifo(VecDeque::new()),
        };
        WorkQueue {
            inner: Mutex::new(Inner { items, alloc: 0 }),
        }
    }

    /// Admit new work; assigns the next sequence number.
    pub fn enqueue(&self, stream: Stream<T>) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.alloc;
        inner.alloc += 1;
        let work = Work { seq, stream };
        match &mut inner.items {
            Discipline::Lifo(stack) => stack.push(work),
            Discipline::Fifo(queue) => queue.push_back(work),
        }
        seq
    }

    /// Admit a run of streams only if `seq` is still the newest assigned
    /// sequence number, handing them back otherwise. Keeps a split's
    /// operands contiguous in sequence space; Ahead needs this so sequence
    /// order stays source order.
    pub fn enqueue_after(
        &self,
        seq: u64,
        streams: Vec<Stream<T>>,
    ) -> Result<(), Vec<Stream<T>>> {
        let mut inner = self.inner.lock();
        if inner.alloc != seq + 1 {
            return Err(streams);
        }
        for stream in streams {
            let next = inner.alloc;
            inner.alloc += 1;
            let work = Work { seq: next, stream };
            match &mut inner.items {
                Discipline::Lifo(stack) => stack.push(work),
                Discipline::Fifo(queue) => queue.push_back(work),
            }
        }
        Ok(())
    }

    /// Put interrupted work back at the head, keeping its sequence number.
    pub fn requeue(&self, work: Work<T>) {
        let mut inner = self.inner.lock();
        match &mut inner.items {
            Discipline::Lifo(stack) => stack.push(work),
            Discipline::Fifo(queue) => queue.push_front(work),
        }
    }

    pub fn dequeue(&self) -> Option<Work<T>> {
        let mut inner = self.inner.lock();
        match &mut inner.items {
            Discipline::Lifo(stack) => stack.pop(),
            Discipline::Fifo(queue) => queue.pop_front(),
        }
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        match &inner.items {
            Discipline::Lifo(stack) => stack.len(),
            Discipline::Fifo(queue) => queue.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_dequeues_in_enqueue_order() {
        let q: WorkQueue<u32> = WorkQueue::new(Style::WAsync);
        assert_eq!(q.enqueue(Stream::once(1)), 0);
        assert_eq!(q.enqueue(Stream::once(2)), 1);
        assert_eq!(q.dequeue().map(|w| w.seq), Some(0));
        assert_eq!(q.dequeue().map(|w| w.seq), Some(1));
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn lifo_dequeues_newest_first() {
        let q: WorkQueue<u32> = WorkQueue::new(Style::Async);
        q.enqueue(Stream::once(1));
        q.enqueue(Stream::once(2));
        assert_eq!(q.dequeue().map(|w| w.seq), Some(1));
        assert_eq!(q.dequeue().map(|w| w.seq), Some(0));
    }

    #[test]
    fn enqueue_after_requires_the_tail() {
        let q: WorkQueue<u32> = WorkQueue::new(Style::Ahead);
        let seq = q.enqueue(Stream::once(1));
        assert!(q.enqueue_after(seq, vec![Stream::once(2), Stream::once(3)]).is_ok());
        // seq 0 is no longer the newest assigned
        assert!(q.enqueue_after(seq, vec![Stream::once(4)]).is_err());
        let seqs: Vec<u64> = std::iter::from_fn(|| q.dequeue().map(|w| w.seq)).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn requeue_goes_to_the_head() {
        let q: WorkQueue<u32> = WorkQueue::new(Style::Ahead);
        q.enqueue(Stream::once(1));
        q.enqueue(Stream::once(2));
        let first = q.dequeue().unwrap();
        q.requeue(first);
        assert_eq!(q.dequeue().map(|w| w.seq), Some(0));
    }
}
