use super::*;
use brook_core::PlayerError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn pool(count: usize, size: usize, descs: usize) -> BufferPool {
    BufferPool::new(PoolConfig {
        buffer_count: count,
        buffer_size: size,
        max_packet_descs: descs,
    })
}

#[test]
fn append_accumulates_packets_and_descriptors() {
    let p = pool(4, 64, 8);
    assert_eq!(p.try_append(b"0123456789", 1024).unwrap(), Append::Appended);
    assert_eq!(p.try_append(b"abcdef", 1024).unwrap(), Append::Appended);
    assert_eq!(p.fill_len(), 16);
    assert_eq!(p.fill_packets(), 2);

    let filled = p.submit_current().unwrap();
    assert_eq!(filled.index, 0);
    assert_eq!(&filled.data[..], b"0123456789abcdef");
    assert_eq!(filled.descs.len(), 2);
    assert_eq!(filled.descs[0].start_offset, 0);
    assert_eq!(filled.descs[0].byte_size, 10);
    assert_eq!(filled.descs[1].start_offset, 10);
    assert_eq!(filled.descs[1].byte_size, 6);
    assert_eq!(filled.descs[1].frames, 1024);
}

#[test]
fn full_when_bytes_do_not_fit() {
    let p = pool(4, 16, 8);
    assert_eq!(p.try_append(&[0u8; 12], 0).unwrap(), Append::Appended);
    assert_eq!(p.try_append(&[0u8; 8], 0).unwrap(), Append::Full);
    // After submitting, the same packet fits in the fresh buffer.
    assert!(p.submit_current().is_some());
    assert_eq!(p.try_append(&[0u8; 8], 0).unwrap(), Append::Appended);
}

#[test]
fn full_when_descriptor_slots_exhausted() {
    let p = pool(4, 1024, 2);
    assert_eq!(p.try_append(b"a", 0).unwrap(), Append::Appended);
    assert_eq!(p.try_append(b"b", 0).unwrap(), Append::Appended);
    assert_eq!(p.try_append(b"c", 0).unwrap(), Append::Full);
}

#[test]
fn oversized_packet_is_buffer_too_small() {
    let p = pool(4, 16, 8);
    match p.try_append(&[0u8; 17], 0) {
        Err(PlayerError::BufferTooSmall { packet, capacity }) => {
            assert_eq!(packet, 17);
            assert_eq!(capacity, 16);
        }
        other => panic!("expected BufferTooSmall, got {:?}", other),
    }
}

#[test]
fn submit_of_empty_target_is_none() {
    let p = pool(4, 16, 8);
    assert!(p.submit_current().is_none());
}

#[test]
fn in_use_never_exceeds_buffer_count() {
    let p = pool(3, 16, 8);
    for _ in 0..3 {
        p.try_append(b"x", 0).unwrap();
        assert!(p.submit_current().is_some());
    }
    assert_eq!(p.in_use_count(), 3);
    assert_eq!(p.in_use_count(), p.buffer_count());
}

#[test]
fn wait_blocks_until_completion_then_wakes_once() {
    let p = Arc::new(pool(2, 16, 8));
    for _ in 0..2 {
        p.try_append(b"data", 0).unwrap();
        p.submit_current().unwrap();
    }
    assert_eq!(p.in_use_count(), 2);

    let woke = Arc::new(AtomicBool::new(false));
    let p2 = Arc::clone(&p);
    let woke2 = Arc::clone(&woke);
    let filler = thread::spawn(move || {
        let free = p2.wait_fill_free();
        woke2.store(true, Ordering::SeqCst);
        free
    });

    // Blocked while every buffer is in flight.
    thread::sleep(Duration::from_millis(50));
    assert!(!woke.load(Ordering::SeqCst));

    // A completion on the fill target frees it and wakes the filler.
    assert!(p.complete(0));
    let free = filler.join().unwrap();
    assert!(free);
    assert!(woke.load(Ordering::SeqCst));
    assert_eq!(p.in_use_count(), 1);
}

#[test]
fn shutdown_preempts_blocked_filler() {
    let p = Arc::new(pool(1, 16, 8));
    p.try_append(b"data", 0).unwrap();
    p.submit_current().unwrap();

    let p2 = Arc::clone(&p);
    let filler = thread::spawn(move || p2.wait_fill_free());

    thread::sleep(Duration::from_millis(20));
    p.shutdown();
    assert!(!filler.join().unwrap(), "shutdown should return false");
}

#[test]
fn ten_buffers_complete_in_submission_order() {
    // 10 buffers of 2048 bytes, completed 0..9 in submission order: the
    // free count returns to N with no leaked in-use flags.
    let p = pool(10, 2048, 512);
    for i in 0..10u8 {
        let payload = vec![i; 2048];
        assert_eq!(p.try_append(&payload, 0).unwrap(), Append::Appended);
        let filled = p.submit_current().unwrap();
        assert_eq!(filled.index, i as usize);
        assert_eq!(filled.data.len(), 2048);
    }
    assert_eq!(p.in_use_count(), 10);
    assert_eq!(p.queued_bytes(), 10 * 2048);

    for i in 0..10 {
        assert!(p.complete(i));
    }
    assert_eq!(p.in_use_count(), 0);
    assert_eq!(p.queued_bytes(), 0);

    // Filling wrapped back to slot 0 and the slots are usable again.
    p.try_append(&[0u8; 1], 0).unwrap();
    let reused = p.submit_current().unwrap();
    assert_eq!(reused.index, 0);
    assert!(p.wait_fill_free());
    assert!(p.complete(0));
    assert_eq!(p.in_use_count(), 0);
}

#[test]
fn stale_completion_is_tolerated() {
    let p = pool(2, 16, 8);
    assert!(!p.complete(0), "free slot completion is a no-op");
    assert!(!p.complete(99), "out-of-range completion is a no-op");
    assert_eq!(p.in_use_count(), 0);
}

#[test]
fn reset_frees_everything() {
    let p = pool(4, 16, 8);
    for _ in 0..3 {
        p.try_append(b"abc", 0).unwrap();
        p.submit_current().unwrap();
    }
    p.try_append(b"partial", 0).ok();
    p.reset();
    assert_eq!(p.in_use_count(), 0);
    assert_eq!(p.queued_bytes(), 0);
    assert_eq!(p.fill_len(), 0);
    assert!(p.wait_fill_free());
}

#[test]
fn reset_fill_discards_partial_target() {
    let p = pool(2, 32, 8);
    p.try_append(b"partial packet", 0).unwrap();
    assert_eq!(p.fill_len(), 14);
    p.reset_fill();
    assert_eq!(p.fill_len(), 0);
    assert_eq!(p.fill_packets(), 0);
}
