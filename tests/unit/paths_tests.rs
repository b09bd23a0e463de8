// Key to path translation unit tests

use std::path::Path;

use multistore::cache::disk::{key_to_path, PathTranslator};
use multistore::cache::CacheError;

#[test]
fn test_key_keeps_directory_structure() {
    let path = key_to_path(Path::new("/cache"), "s3", "bucket/dir/file.txt").unwrap();
    assert_eq!(path, Path::new("/cache/s3/bucket/dir/file.txt"));
}

#[test]
fn test_leading_and_duplicate_slashes_are_ignored() {
    let path = key_to_path(Path::new("/cache"), "s3", "//bucket/./file").unwrap();
    assert_eq!(path, Path::new("/cache/s3/bucket/file"));
}

#[test]
fn test_escaping_keys_are_rejected() {
    for key in ["../etc/passwd", "a/../../b", "", "/", "a/.tmp-x/b"] {
        let err = key_to_path(Path::new("/cache"), "s3", key).unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)), "{key}: {err:?}");
    }
}

#[test]
fn test_invalid_profile_is_rejected() {
    for profile in ["", "..", "a/b", ".tmp-s3"] {
        assert!(key_to_path(Path::new("/cache"), profile, "k").is_err());
    }
}

#[test]
fn test_companion_paths() {
    let translator = PathTranslator::new("/cache/s3");
    let entry = translator.resolve("bucket/file.bin").unwrap();
    assert_eq!(entry.key(), "bucket/file.bin");
    assert_eq!(entry.data_path(), Path::new("/cache/s3/bucket/file.bin"));
    assert_eq!(entry.lock_path(), Path::new("/cache/s3/bucket/.file.bin.lock"));
    assert_eq!(entry.chunk_path(3), Path::new("/cache/s3/bucket/.file.bin#chunk3"));
    assert_eq!(
        entry.chunk_lock_path(3),
        Path::new("/cache/s3/bucket/.file.bin#chunk3.lock")
    );
}

#[test]
fn test_chunk_file_names_are_reserved() {
    let translator = PathTranslator::new("/cache/s3");
    assert!(translator.resolve("bucket/.file#chunk0").is_err());
    assert!(translator.resolve("bucket/.file.lock").is_err());
}
