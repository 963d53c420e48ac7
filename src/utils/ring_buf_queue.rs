use ringbuf::{Consumer, Producer, RingBuffer};
use std::{
    borrow::Cow,
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

type Overflow = Arc<Mutex<VecDeque<u8>>>;

fn lock(overflow: &Overflow) -> MutexGuard<'_, VecDeque<u8>> {
    overflow.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lock-free byte queue between the user/auto-reply side and the serial thread.
/// Bytes that do not fit the ring spill into an overflow the drain empties
/// once the ring is, so nothing is dropped or reordered.
pub fn write_queue<const SIZE: usize>() -> (WriteQueue, WriteDrain<SIZE>) {
    let (ring, drain) = RingBuffer::<u8>::new(SIZE).split();
    let overflow = Overflow::default();
    (
        WriteQueue {
            overflow: Arc::clone(&overflow),
            ring,
        },
        WriteDrain {
            scratch: [0u8; SIZE],
            overflow,
            drain,
        },
    )
}

pub struct WriteQueue {
    overflow: Overflow,
    ring: Producer<u8>,
}

impl WriteQueue {
    pub fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        // held while touching the ring so the drain cannot slip in between
        let mut overflow = lock(&self.overflow);
        let pushed = if overflow.is_empty() {
            self.ring.push_slice(bytes)
        } else {
            0
        };
        overflow.extend(&bytes[pushed..]);
    }

    pub fn pending_overflow(&self) -> usize {
        lock(&self.overflow).len()
    }
}

pub struct WriteDrain<const SIZE: usize> {
    scratch: [u8; SIZE],
    overflow: Overflow,
    drain: Consumer<u8>,
}

impl<const SIZE: usize> WriteDrain<SIZE> {
    /// Returns whatever is queued, or an empty slice.
    pub fn pop(&mut self) -> Cow<'_, [u8]> {
        let mut count = self.drain.pop_slice(&mut self.scratch);
        if count == 0 {
            let mut overflow = lock(&self.overflow);
            count = overflow.len().min(SIZE);
            for (slot, byte) in self.scratch.iter_mut().zip(overflow.drain(..count)) {
                *slot = byte;
            }
        }
        Cow::Borrowed(&self.scratch[..count])
    }
}

/// Several producers feed one serial port; this drains them in order.
pub struct WriteDrains<const SIZE: usize> {
    drains: Vec<WriteDrain<SIZE>>,
}

impl<const SIZE: usize> WriteDrains<SIZE> {
    pub fn new(drains: Vec<WriteDrain<SIZE>>) -> Self {
        Self { drains }
    }

    pub fn pop_all(&mut self) -> Vec<u8> {
        let mut out = vec![];
        for drain in self.drains.iter_mut() {
            loop {
                let chunk = drain.pop();
                if chunk.is_empty() {
                    break;
                }
                out.extend_from_slice(&chunk);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_kept_in_order() {
        let (mut queue, drain) = write_queue::<4>();
        let mut drains = WriteDrains::new(vec![drain]);
        queue.push(b"abcdef");
        queue.push(b"gh");
        assert_eq!(queue.pending_overflow(), 4);
        assert_eq!(drains.pop_all(), b"abcdefgh");
        assert_eq!(queue.pending_overflow(), 0);
    }

    #[test]
    fn long_line_goes_out_without_another_push() {
        let (mut queue, drain) = write_queue::<4>();
        let mut drains = WriteDrains::new(vec![drain]);
        queue.push(b"abcdef");
        let mut got = vec![];
        for _ in 0..6 {
            got.extend(drains.pop_all());
        }
        assert_eq!(got, b"abcdef");
    }

    #[test]
    fn pushes_after_a_spill_queue_behind_it() {
        let (mut queue, mut drain) = write_queue::<4>();
        queue.push(b"abcdef");
        assert_eq!(&*drain.pop(), b"abcd");
        queue.push(b"xy");
        assert_eq!(&*drain.pop(), b"efxy");
        assert!(drain.pop().is_empty());
    }

    #[test]
    fn drains_are_read_in_order() {
        let (mut first, a) = write_queue::<16>();
        let (mut second, b) = write_queue::<16>();
        second.push(b"reply");
        first.push(b"user ");
        let mut drains = WriteDrains::new(vec![a, b]);
        assert_eq!(drains.pop_all(), b"user reply");
        assert!(drains.pop_all().is_empty());
    }
}
