// Cache configuration unit tests

use multistore::cache::{parse_size, CacheConfig, EvictionPolicy, EvictionPolicyConfig};
use multistore::constants::{DEFAULT_CACHE_DIR_NAME, DEFAULT_CACHE_REFRESH_INTERVAL_SECS};
use rstest::rstest;

#[rstest]
#[case("512K", 512 * 1024)]
#[case("10m", 10 * 1024 * 1024)]
#[case("64M", 64 * 1024 * 1024)]
#[case(" 2G ", 2 * 1024 * 1024 * 1024)]
fn test_parse_size_accepts_units(#[case] input: &str, #[case] expected: u64) {
    assert_eq!(parse_size(input).unwrap(), expected);
}

#[rstest]
#[case("")]
#[case("10")]
#[case("10T")]
#[case("-1G")]
#[case("1.5G")]
#[case("G")]
fn test_parse_size_rejects_malformed_values(#[case] input: &str) {
    assert!(parse_size(input).is_err());
}

#[test]
fn test_cache_section_defaults() {
    let config: CacheConfig = serde_yaml::from_str("size: 10G\n").unwrap();
    assert_eq!(config.size_bytes().unwrap(), 10 * 1024 * 1024 * 1024);
    assert_eq!(config.cache_line_size_bytes().unwrap(), 64 * 1024 * 1024);
    assert!(config.check_source_version);
    assert!(config.location.is_absolute());
    assert!(config.location.ends_with(DEFAULT_CACHE_DIR_NAME));
    assert_eq!(config.eviction_policy.policy, EvictionPolicy::Fifo);
    assert_eq!(
        config.eviction_policy.refresh_interval,
        DEFAULT_CACHE_REFRESH_INTERVAL_SECS
    );
    assert_eq!(config.eviction_policy.purge_factor, 0);
}

#[test]
fn test_size_is_required() {
    let err = serde_yaml::from_str::<CacheConfig>("location: /tmp/c\n").unwrap_err();
    assert!(err.to_string().contains("'size' is required"));
}

#[test]
fn test_legacy_use_etag_maps_to_check_source_version() {
    let config: CacheConfig =
        serde_yaml::from_str("size: 1G\nlocation: /tmp/c\nuse_etag: false\n").unwrap();
    assert!(!config.check_source_version);

    // The new name wins when both are present
    let config: CacheConfig = serde_yaml::from_str(
        "size: 1G\nlocation: /tmp/c\nuse_etag: false\ncheck_source_version: true\n",
    )
    .unwrap();
    assert!(config.check_source_version);
}

#[test]
fn test_policy_serializes_lowercase() {
    let yaml = serde_yaml::to_string(&EvictionPolicyConfig::new(EvictionPolicy::NoEviction))
        .unwrap();
    assert!(yaml.contains("policy: no_eviction"));
}

#[rstest]
#[case("1M", "2M", "/tmp/c", 0)]
#[case("1M", "64K", "relative/dir", 0)]
#[case("1M", "64K", "/tmp/c", 101)]
#[case("0K", "0K", "/tmp/c", 0)]
fn test_invalid_cache_config_is_rejected(
    #[case] size: &str,
    #[case] cache_line_size: &str,
    #[case] location: &str,
    #[case] purge_factor: u8,
) {
    let mut config = CacheConfig::new(size, location);
    config.cache_line_size = cache_line_size.to_string();
    config.eviction_policy.purge_factor = purge_factor;
    assert!(config.validate().is_err());
}

#[test]
fn test_cache_line_size_equal_to_size_is_valid() {
    let mut config = CacheConfig::new("1M", "/tmp/c");
    config.cache_line_size = "1024K".to_string();
    assert!(config.validate().is_ok());
}
