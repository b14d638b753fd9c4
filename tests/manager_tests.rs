//! Tests for StorageManager
//!
//! These tests verify:
//! - Initialization validates the spill directory and limits
//! - Batch round-trips by begin-row key, across file rotation
//! - Idempotent re-adds and the LOB rejection policy
//! - The open-handle bound under many backing files
//! - Stream removal, non-resurrection, and total-effort shutdown

use std::fs;
use std::path::Path;

use spillstore::{Batch, ColumnType, Config, SpillError, StorageManager, StreamId, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Install a subscriber once so policy warnings show up in test output
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("spillstore=warn")),
        )
        .with_test_writer()
        .try_init();
}

fn setup_manager() -> (TempDir, StorageManager) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let manager = StorageManager::open(Config::new(temp_dir.path())).unwrap();
    (temp_dir, manager)
}

fn setup_manager_with(max_open_handles: usize, max_file_size: u64) -> (TempDir, StorageManager) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder(temp_dir.path())
        .max_open_handles(max_open_handles)
        .max_file_size(max_file_size)
        .build();
    let manager = StorageManager::open(config).unwrap();
    (temp_dir, manager)
}

fn sample_batch(begin_row: u64) -> Batch {
    Batch::new(
        begin_row,
        vec![ColumnType::Integer, ColumnType::String],
        vec![
            vec![Value::Integer(1), Value::String("one".to_string())],
            vec![Value::Integer(2), Value::Null],
        ],
    )
}

/// Single-column binary batch whose encoded blob is exactly `encoded_size`
/// bytes. The blob overhead around one binary cell is 25 bytes.
fn binary_batch(begin_row: u64, encoded_size: usize) -> Batch {
    let payload = vec![0xabu8; encoded_size - 25];
    let batch = Batch::new(
        begin_row,
        vec![ColumnType::Binary],
        vec![vec![Value::Binary(payload)]],
    );
    let blob = spillstore::batch::codec::encode(&batch).unwrap();
    assert_eq!(blob.len(), encoded_size);
    batch
}

fn spill_file_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().is_file())
        .count()
}

fn spill_bytes_on_disk(dir: &Path) -> u64 {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().metadata().unwrap().len())
        .sum()
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("spill");

    assert!(!path.exists());

    let _manager = StorageManager::open(Config::new(&path)).unwrap();

    assert!(path.is_dir());
}

#[test]
fn test_open_fails_when_path_is_a_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("occupied");
    fs::write(&path, b"not a directory").unwrap();

    let result = StorageManager::open(Config::new(&path));

    assert!(matches!(result, Err(SpillError::Config(_))));
}

#[test]
fn test_open_rejects_zero_limits() {
    let temp_dir = TempDir::new().unwrap();

    let config = Config::builder(temp_dir.path()).max_open_handles(0).build();
    assert!(matches!(
        StorageManager::open(config),
        Err(SpillError::Config(_))
    ));

    let config = Config::builder(temp_dir.path()).max_file_size(0).build();
    assert!(matches!(
        StorageManager::open(config),
        Err(SpillError::Config(_))
    ));
}

#[test]
fn test_default_limits() {
    let (_temp, manager) = setup_manager();

    assert_eq!(manager.config().max_open_handles, 10);
    assert_eq!(manager.config().max_file_size, 2048 * 1024 * 1024);
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_add_and_get_round_trip() {
    let (_temp, manager) = setup_manager();
    let stream = StreamId(1);
    let batch = sample_batch(1);

    manager.add_batch(stream, &batch).unwrap();
    let read = manager.get_batch(stream, 1, batch.columns()).unwrap();

    assert_eq!(read, batch);
}

#[test]
fn test_random_access_across_batches() {
    let (_temp, manager) = setup_manager();
    let stream = StreamId(1);

    let batches: Vec<Batch> = (0..5).map(|i| sample_batch(1 + i * 100)).collect();
    for batch in &batches {
        manager.add_batch(stream, batch).unwrap();
    }

    // Read back in an order unrelated to write order
    for &begin_row in &[401, 1, 201, 301, 101] {
        let expected = batches.iter().find(|b| b.begin_row() == begin_row).unwrap();
        let read = manager
            .get_batch(stream, begin_row, expected.columns())
            .unwrap();
        assert_eq!(&read, expected);
    }
}

#[test]
fn test_streams_are_independent() {
    let (_temp, manager) = setup_manager();

    let batch_a = sample_batch(1);
    let batch_b = binary_batch(1, 100);
    manager.add_batch(StreamId(1), &batch_a).unwrap();
    manager.add_batch(StreamId(2), &batch_b).unwrap();

    assert_eq!(
        manager.get_batch(StreamId(1), 1, batch_a.columns()).unwrap(),
        batch_a
    );
    assert_eq!(
        manager.get_batch(StreamId(2), 1, batch_b.columns()).unwrap(),
        batch_b
    );
    assert_eq!(manager.stream_count(), 2);
}

#[test]
fn test_backing_file_naming() {
    let (temp_dir, manager) = setup_manager();

    manager.add_batch(StreamId(7), &sample_batch(1)).unwrap();

    assert!(temp_dir.path().join("stream_000007_000.spill").is_file());
}

// =============================================================================
// Idempotence Tests
// =============================================================================

#[test]
fn test_repeated_add_is_a_noop() {
    let (temp_dir, manager) = setup_manager();
    let stream = StreamId(1);
    let batch = sample_batch(1);

    manager.add_batch(stream, &batch).unwrap();
    let bytes_after_first = spill_bytes_on_disk(temp_dir.path());

    manager.add_batch(stream, &batch).unwrap();
    let bytes_after_second = spill_bytes_on_disk(temp_dir.path());

    assert_eq!(bytes_after_first, bytes_after_second);
    assert_eq!(
        manager.get_batch(stream, 1, batch.columns()).unwrap(),
        batch
    );
}

// =============================================================================
// Error Taxonomy Tests
// =============================================================================

#[test]
fn test_get_from_unknown_stream() {
    let (_temp, manager) = setup_manager();

    let result = manager.get_batch(StreamId(99), 1, &[ColumnType::Integer]);

    assert!(matches!(result, Err(SpillError::StreamNotFound(_))));
}

#[test]
fn test_get_unwritten_key_is_contract_violation() {
    let (_temp, manager) = setup_manager();
    let stream = StreamId(1);
    let batch = sample_batch(1);

    manager.add_batch(stream, &batch).unwrap();
    let result = manager.get_batch(stream, 500, batch.columns());

    // Distinct from StreamNotFound: the stream exists, the key was never added
    assert!(matches!(
        result,
        Err(SpillError::BatchNotPersisted { begin_row: 500, .. })
    ));
}

#[test]
fn test_lob_batches_are_rejected() {
    let (temp_dir, manager) = setup_manager();
    let batch = Batch::new(
        1,
        vec![ColumnType::Integer, ColumnType::Blob],
        vec![vec![Value::Integer(1), Value::Null]],
    );

    let result = manager.add_batch(StreamId(1), &batch);

    assert!(matches!(result, Err(SpillError::UnsupportedContent(_))));
    // Rejection happens before any file is touched
    assert_eq!(spill_file_count(temp_dir.path()), 0);
}

#[test]
fn test_stream_id_reuse_is_a_file_conflict() {
    let (temp_dir, manager) = setup_manager();

    // A leftover file with the exact allocation name means a stream id
    // was reused; overwriting it would corrupt the other stream's data
    fs::write(temp_dir.path().join("stream_000009_000.spill"), b"stale").unwrap();

    let result = manager.add_batch(StreamId(9), &sample_batch(1));

    assert!(matches!(result, Err(SpillError::FileConflict { .. })));
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_rotation_at_max_file_size() {
    let (temp_dir, manager) = setup_manager_with(10, 1000);
    let stream = StreamId(1);

    // 400 + 400 = 800 fits in file 0; the third 400 would make 1200 > 1000
    for begin_row in [1, 101, 201] {
        manager
            .add_batch(stream, &binary_batch(begin_row, 400))
            .unwrap();
    }

    assert_eq!(manager.backing_file_count(stream).unwrap(), 2);
    assert_eq!(spill_file_count(temp_dir.path()), 2);
    assert_eq!(
        fs::metadata(temp_dir.path().join("stream_000001_000.spill"))
            .unwrap()
            .len(),
        800
    );
    assert_eq!(
        fs::metadata(temp_dir.path().join("stream_000001_001.spill"))
            .unwrap()
            .len(),
        400
    );

    // All three remain readable after rotation
    for begin_row in [1, 101, 201] {
        let read = manager
            .get_batch(stream, begin_row, &[ColumnType::Binary])
            .unwrap();
        assert_eq!(read, binary_batch(begin_row, 400));
    }
}

#[test]
fn test_oversized_batch_gets_dedicated_file() {
    let (temp_dir, manager) = setup_manager_with(10, 1000);
    let stream = StreamId(1);
    let oversized = binary_batch(1, 1500);

    manager.add_batch(stream, &oversized).unwrap();

    assert_eq!(manager.backing_file_count(stream).unwrap(), 1);
    assert_eq!(spill_bytes_on_disk(temp_dir.path()), 1500);
    assert_eq!(
        manager.get_batch(stream, 1, oversized.columns()).unwrap(),
        oversized
    );
}

#[test]
fn test_oversized_batch_does_not_share_a_file() {
    let (_temp, manager) = setup_manager_with(10, 1000);
    let stream = StreamId(1);

    manager.add_batch(stream, &binary_batch(1, 400)).unwrap();
    manager.add_batch(stream, &binary_batch(101, 1500)).unwrap();
    manager.add_batch(stream, &binary_batch(201, 400)).unwrap();

    // 400 | 1500 | 400 — the oversized batch forced rotation on both sides
    assert_eq!(manager.backing_file_count(stream).unwrap(), 3);

    for (begin_row, size) in [(1, 400), (101, 1500), (201, 400)] {
        let read = manager
            .get_batch(stream, begin_row, &[ColumnType::Binary])
            .unwrap();
        assert_eq!(read, binary_batch(begin_row, size));
    }
}

// =============================================================================
// Handle Bound Tests
// =============================================================================

#[test]
fn test_handle_cache_stays_bounded() {
    // Tiny max_file_size: every batch rotates into its own backing file
    let (_temp, manager) = setup_manager_with(3, 50);

    for stream_id in 0..8 {
        let stream = StreamId(stream_id);
        manager.add_batch(stream, &binary_batch(1, 100)).unwrap();
        manager.add_batch(stream, &binary_batch(101, 100)).unwrap();
        assert!(manager.cached_handle_count() <= 3);
    }

    // 16 distinct backing files were touched; reads stay within the bound
    for stream_id in 0..8 {
        let stream = StreamId(stream_id);
        for begin_row in [1, 101] {
            let read = manager
                .get_batch(stream, begin_row, &[ColumnType::Binary])
                .unwrap();
            assert_eq!(read, binary_batch(begin_row, 100));
            assert!(manager.cached_handle_count() <= 3);
        }
    }
}

// =============================================================================
// Removal Tests
// =============================================================================

#[test]
fn test_remove_batch_is_a_noop() {
    let (_temp, manager) = setup_manager();
    let stream = StreamId(1);
    let batch = sample_batch(1);

    manager.add_batch(stream, &batch).unwrap();
    manager.remove_batch(stream, 1);

    // Single-batch removal is deferred entirely to whole-stream removal
    assert_eq!(
        manager.get_batch(stream, 1, batch.columns()).unwrap(),
        batch
    );
}

#[test]
fn test_remove_batches_deletes_files_and_index() {
    let (temp_dir, manager) = setup_manager_with(10, 1000);
    let stream = StreamId(1);

    for begin_row in [1, 101, 201] {
        manager
            .add_batch(stream, &binary_batch(begin_row, 400))
            .unwrap();
    }

    manager.remove_batches(stream).unwrap();

    assert_eq!(spill_file_count(temp_dir.path()), 0);
    assert_eq!(manager.stream_count(), 0);
    assert!(matches!(
        manager.get_batch(stream, 1, &[ColumnType::Binary]),
        Err(SpillError::StreamNotFound(_))
    ));
}

#[test]
fn test_removed_stream_is_never_resurrected() {
    let (temp_dir, manager) = setup_manager();
    let stream = StreamId(1);

    manager.add_batch(stream, &sample_batch(1)).unwrap();
    manager.remove_batches(stream).unwrap();

    let result = manager.add_batch(stream, &sample_batch(1));

    assert!(matches!(result, Err(SpillError::StreamNotFound(_))));
    assert_eq!(spill_file_count(temp_dir.path()), 0);
}

#[test]
fn test_remove_batches_is_idempotent() {
    let (_temp, manager) = setup_manager();
    let stream = StreamId(1);

    // Unknown stream: already absent, so removal succeeds
    manager.remove_batches(stream).unwrap();

    manager.add_batch(stream, &sample_batch(1)).unwrap();
    manager.remove_batches(stream).unwrap();
    manager.remove_batches(stream).unwrap();
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_shutdown_removes_everything() {
    let (temp_dir, manager) = setup_manager();

    for stream_id in 1..=3 {
        manager
            .add_batch(StreamId(stream_id), &sample_batch(1))
            .unwrap();
    }
    assert_eq!(spill_file_count(temp_dir.path()), 3);

    manager.shutdown();

    assert_eq!(spill_file_count(temp_dir.path()), 0);
}

#[test]
fn test_shutdown_survives_one_failing_stream() {
    let (temp_dir, manager) = setup_manager();

    for stream_id in 1..=3 {
        manager
            .add_batch(StreamId(stream_id), &sample_batch(1))
            .unwrap();
    }

    // Simulate a cleanup failure: stream 2's backing file vanishes out
    // from under the manager
    fs::remove_file(temp_dir.path().join("stream_000002_000.spill")).unwrap();

    manager.shutdown();

    // The failure was logged, not fatal; the other two streams' files are gone
    assert_eq!(spill_file_count(temp_dir.path()), 0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_parallel_streams() {
    let (_temp, manager) = setup_manager_with(4, 1000);

    std::thread::scope(|scope| {
        for stream_id in 0..6 {
            let manager = &manager;
            scope.spawn(move || {
                let stream = StreamId(stream_id);
                for i in 0..10 {
                    let begin_row = 1 + i * 100;
                    manager
                        .add_batch(stream, &binary_batch(begin_row, 300))
                        .unwrap();
                }
                for i in 0..10 {
                    let begin_row = 1 + i * 100;
                    let read = manager
                        .get_batch(stream, begin_row, &[ColumnType::Binary])
                        .unwrap();
                    assert_eq!(read, binary_batch(begin_row, 300));
                }
            });
        }
    });

    assert_eq!(manager.stream_count(), 6);
    assert!(manager.cached_handle_count() <= 4);
}

#[test]
fn test_concurrent_adds_to_one_stream() {
    let (_temp, manager) = setup_manager();
    let stream = StreamId(1);

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let manager = &manager;
            scope.spawn(move || {
                for i in 0..5 {
                    let begin_row = 1 + (worker * 5 + i) * 100;
                    manager.add_batch(stream, &sample_batch(begin_row)).unwrap();
                }
            });
        }
    });

    for i in 0..20 {
        let begin_row = 1 + i * 100;
        let read = manager
            .get_batch(stream, begin_row, &[ColumnType::Integer, ColumnType::String])
            .unwrap();
        assert_eq!(read, sample_batch(begin_row));
    }
}
