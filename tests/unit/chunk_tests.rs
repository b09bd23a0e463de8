// Chunk arithmetic unit tests

use multistore::cache::disk::{chunk_slice, chunk_span};
use multistore::cache::ByteRange;

const LINE: u64 = 100;

#[test]
fn test_span_within_one_chunk() {
    assert_eq!(chunk_span(ByteRange::new(10, 20), LINE), Some(0..=0));
    assert_eq!(chunk_span(ByteRange::new(100, 100), LINE), Some(1..=1));
}

#[test]
fn test_span_across_chunk_boundaries() {
    assert_eq!(chunk_span(ByteRange::new(99, 2), LINE), Some(0..=1));
    assert_eq!(chunk_span(ByteRange::new(50, 250), LINE), Some(0..=2));
}

#[test]
fn test_empty_range_touches_no_chunk() {
    assert_eq!(chunk_span(ByteRange::new(500, 0), LINE), None);
}

#[test]
fn test_slices_reassemble_the_range() {
    let range = ByteRange::new(50, 250);
    let slices: Vec<_> = chunk_span(range, LINE)
        .unwrap()
        .map(|index| chunk_slice(range, index, LINE))
        .collect();
    assert_eq!(slices, vec![50..100, 0..100, 0..100]);
    let total: usize = slices.iter().map(|s| s.len()).sum();
    assert_eq!(total as u64, range.size);
}

#[test]
fn test_clamp_to_object_size() {
    assert_eq!(ByteRange::new(90, 50).clamp_to(100), ByteRange::new(90, 10));
    assert_eq!(ByteRange::new(200, 50).clamp_to(100), ByteRange::new(100, 0));
    assert!(ByteRange::new(200, 50).clamp_to(100).is_empty());
}
