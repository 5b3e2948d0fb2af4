//! End-to-end exercise of `RingBuffer` under real producer/consumer
//! threads, as an external user of the crate would drive it.

use std::sync::Arc;
use std::thread;

use debug_stream::RingBuffer;

#[test]
fn capacity_is_one_less_than_n() {
    let ring: RingBuffer<u32, 16> = RingBuffer::new();
    assert_eq!(ring.capacity(), 15);
}

#[test]
fn fills_to_capacity_then_rejects_further_pushes() {
    let ring: RingBuffer<u32, 8> = RingBuffer::new();
    for i in 0..ring.capacity() as u32 {
        assert!(ring.try_push(i));
    }
    assert!(!ring.try_push(999), "ring should reject a push past capacity");
    assert_eq!(ring.size(), ring.capacity());
}

#[test]
fn concurrent_producer_and_consumer_never_lose_or_duplicate_items() {
    let ring: Arc<RingBuffer<u64, 128>> = Arc::new(RingBuffer::new());
    const TOTAL: u64 = 50_000;

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let mut next = 0u64;
            while next < TOTAL {
                if ring.try_push(next) {
                    next += 1;
                } else {
                    thread::yield_now();
                }
            }
        })
    };

    let consumer = thread::spawn(move || {
        let mut expected = 0u64;
        while expected < TOTAL {
            if let Some(v) = ring.try_pop() {
                assert_eq!(v, expected, "items must arrive in push order");
                expected += 1;
            } else {
                thread::yield_now();
            }
        }
        assert!(ring.is_empty());
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}
