use std::time::Duration;

use hytale_avail::backoff::{MAX_DELAY, next_delay};
use hytale_avail::client::{AvailabilityCheck, RawCheck};
use hytale_avail::config::Config;
use hytale_avail::engine::{Engine, NoopObserver, Verdict};
use hytale_avail::validate::{InvalidUsername, collect_candidates, validate_username};

#[test]
fn public_api_validator_boundaries() {
    assert!(validate_username("abc").is_ok());
    assert!(validate_username("a234567890123456").is_ok());
    assert!(matches!(
        validate_username("ab"),
        Err(InvalidUsername::TooShort { .. })
    ));
    assert!(matches!(
        validate_username("this_name_is_17ch"),
        Err(InvalidUsername::TooLong { .. })
    ));
    assert!(matches!(
        validate_username("with space"),
        Err(InvalidUsername::Char { .. })
    ));
}

#[test]
fn public_api_dedup_keeps_first_casing() {
    let set = collect_candidates(["Foo", "foo", "FOO", "bar"]);
    let names: Vec<&str> = set.candidates.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Foo", "bar"]);
    assert_eq!(set.duplicates, 2);
}

#[test]
fn public_api_backoff_monotone_and_capped() {
    let base = Duration::from_secs(10);
    assert!(next_delay(base, 0) <= next_delay(base, 1));
    assert!(next_delay(base, 1) <= next_delay(base, 2));
    assert_eq!(next_delay(base, 60), MAX_DELAY);
}

#[test]
fn public_api_config_defaults() {
    let config = Config::default();
    assert_eq!(
        (config.threads, config.timeout, config.retries, config.retry_delay, config.debug),
        (3, 10, 5, 10.0, false)
    );
    assert!(config.validate().is_ok());
}

/// A check implementation that reports names containing "taken" as taken
/// and everything else as available.
struct ByName;

impl AvailabilityCheck for ByName {
    fn check(&self, username: &str) -> RawCheck {
        if username.contains("taken") {
            RawCheck::Taken
        } else {
            RawCheck::Available
        }
    }
}

#[test]
fn public_api_end_to_end_with_injected_client() {
    let config = Config {
        threads: 2,
        retry_delay: 0.0,
        ..Config::default()
    };
    let set = collect_candidates(["free_one", "taken_one", "free_two"]);
    let engine = Engine::new(ByName, &config);

    let summary = engine.run(set.candidates, &NoopObserver);

    let available: Vec<&str> = summary.available.iter().map(|c| c.name.as_str()).collect();
    let taken: Vec<&str> = summary.taken.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(available, ["free_one", "free_two"]);
    assert_eq!(taken, ["taken_one"]);
    assert!(summary.errors.is_empty());
    assert!(!summary.interrupted);
    assert_eq!(summary.stats.checked, 3);
}

#[test]
fn verdict_error_classification() {
    assert!(!Verdict::Available.is_error());
    assert!(!Verdict::Taken.is_error());
    assert!(Verdict::RateLimited.is_error());
    assert!(Verdict::TransientError.is_error());
    assert!(Verdict::FatalError.is_error());
}

// Auto-trait compile-time checks
#[test]
fn engine_types_are_send_sync() {
    fn assert_normal<T: Sized + Send + Sync>() {}
    assert_normal::<hytale_avail::engine::StatsSnapshot>();
    assert_normal::<hytale_avail::engine::Outcome>();
    assert_normal::<hytale_avail::client::HttpClient>();
}
