//! A fixed-capacity queue of fixed-size blocks, shared between a producer
//! (the image writer) and a consumer (the disc sink). Producer and consumer
//! run on separate threads so that a slow sink (an optical drive running at
//! a fixed write speed) does not stall image generation, and vice versa.
//!
//! Under the `std` feature this blocks on a condition variable; under
//! `sync` without `std` it spins, since no_std has no portable thread park.

#[cfg(feature = "std")]
mod imp {
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;
    use std::sync::{Arc, Condvar, Mutex};

    struct Shared {
        queue: Mutex<VecDeque<Vec<u8>>>,
        not_empty: Condvar,
        not_full: Condvar,
        capacity: usize,
        closed: Mutex<bool>,
    }

    /// The producer half of a [`ring_buffer`](super) channel.
    pub struct Producer {
        shared: Arc<Shared>,
    }

    /// The consumer half of a [`ring_buffer`](super) channel.
    pub struct Consumer {
        shared: Arc<Shared>,
    }

    /// Creates a bounded ring buffer of `capacity` blocks and returns its
    /// producer and consumer halves.
    pub fn channel(capacity: usize) -> (Producer, Consumer) {
        assert!(capacity > 0, "ring buffer capacity must be nonzero");
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            closed: Mutex::new(false),
        });
        (
            Producer {
                shared: shared.clone(),
            },
            Consumer { shared },
        )
    }

    impl Producer {
        /// Blocks until there is room, then pushes `block`.
        ///
        /// Returns `Err(block)` if the consumer has been dropped, handing
        /// the block back so the caller can decide what to do with it.
        pub fn push(&self, block: Vec<u8>) -> Result<(), Vec<u8>> {
            let mut queue = self.shared.queue.lock().unwrap();
            while queue.len() >= self.shared.capacity {
                if Arc::strong_count(&self.shared) == 1 {
                    return Err(block);
                }
                queue = self.shared.not_full.wait(queue).unwrap();
            }
            queue.push_back(block);
            self.shared.not_empty.notify_one();
            Ok(())
        }

        /// Signals the consumer that no more blocks are coming, once the
        /// queue drains.
        pub fn close(self) {
            *self.shared.closed.lock().unwrap() = true;
            self.shared.not_empty.notify_all();
        }
    }

    impl Consumer {
        /// Blocks until a block is available or the producer has closed the
        /// channel and the queue is empty, in which case it returns `None`.
        pub fn pop(&self) -> Option<Vec<u8>> {
            let mut queue = self.shared.queue.lock().unwrap();
            loop {
                if let Some(block) = queue.pop_front() {
                    self.shared.not_full.notify_one();
                    return Some(block);
                }
                if *self.shared.closed.lock().unwrap() {
                    return None;
                }
                queue = self.shared.not_empty.wait(queue).unwrap();
            }
        }

        pub fn len(&self) -> usize {
            self.shared.queue.lock().unwrap().len()
        }

        pub fn capacity(&self) -> usize {
            self.shared.capacity
        }
    }
}

#[cfg(not(feature = "std"))]
mod imp {
    use alloc::collections::VecDeque;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use spin::Mutex;

    struct Shared {
        queue: Mutex<VecDeque<Vec<u8>>>,
        capacity: usize,
        closed: Mutex<bool>,
    }

    pub struct Producer {
        shared: Arc<Shared>,
    }

    pub struct Consumer {
        shared: Arc<Shared>,
    }

    pub fn channel(capacity: usize) -> (Producer, Consumer) {
        assert!(capacity > 0, "ring buffer capacity must be nonzero");
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            closed: Mutex::new(false),
        });
        (
            Producer {
                shared: shared.clone(),
            },
            Consumer { shared },
        )
    }

    impl Producer {
        /// Spins until there is room, then pushes `block`. Returns the
        /// block back if the consumer has gone away.
        pub fn push(&self, block: Vec<u8>) -> Result<(), Vec<u8>> {
            loop {
                if Arc::strong_count(&self.shared) == 1 {
                    return Err(block);
                }
                let mut queue = self.shared.queue.lock();
                if queue.len() < self.shared.capacity {
                    queue.push_back(block);
                    return Ok(());
                }
                core::hint::spin_loop();
            }
        }

        pub fn close(self) {
            *self.shared.closed.lock() = true;
        }
    }

    impl Consumer {
        pub fn pop(&self) -> Option<Vec<u8>> {
            loop {
                let mut queue = self.shared.queue.lock();
                if let Some(block) = queue.pop_front() {
                    return Some(block);
                }
                if *self.shared.closed.lock() {
                    return None;
                }
                drop(queue);
                core::hint::spin_loop();
            }
        }

        pub fn len(&self) -> usize {
            self.shared.queue.lock().len()
        }

        pub fn capacity(&self) -> usize {
            self.shared.capacity
        }
    }
}

pub use imp::{Consumer, Producer, channel};

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn pushed_blocks_pop_in_order() {
        let (producer, consumer) = channel(4);
        producer.push(vec![1]).unwrap();
        producer.push(vec![2]).unwrap();
        assert_eq!(consumer.pop(), Some(vec![1]));
        assert_eq!(consumer.pop(), Some(vec![2]));
    }

    #[test]
    fn close_drains_then_returns_none() {
        let (producer, consumer) = channel(4);
        producer.push(vec![9]).unwrap();
        producer.close();
        assert_eq!(consumer.pop(), Some(vec![9]));
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn producer_consumer_across_threads() {
        use std::thread;

        let (producer, consumer) = channel(2);
        let handle = thread::spawn(move || {
            for i in 0..100u8 {
                producer.push(vec![i]).unwrap();
            }
            producer.close();
        });
        let mut received = alloc::vec::Vec::new();
        while let Some(block) = consumer.pop() {
            received.push(block[0]);
        }
        handle.join().unwrap();
        assert_eq!(received, (0..100).collect::<alloc::vec::Vec<u8>>());
    }
}
