//! The concurrent checking engine: a bounded worker pool driving each
//! candidate's retry loop to a terminal outcome.
//!
//! Workers pull candidates from a shared queue and send terminal
//! [`Outcome`]s over a channel to a single aggregating consumer on the
//! calling thread. The queue and the atomic counters are the only shared
//! mutable state; result buckets belong to the consumer alone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use crate::backoff::next_delay;
use crate::client::{AvailabilityCheck, RawCheck};
use crate::config::Config;
use crate::validate::Candidate;

/// Granularity of backoff sleeps, so a cancel request interrupts a wait
/// promptly instead of after a full backoff period.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Terminal classification of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The name is free.
    Available,
    /// The name is in use.
    Taken,
    /// Still rate-limited after exhausting retries.
    RateLimited,
    /// Network-level failures exhausted the retries, or the run was
    /// interrupted while this candidate was in flight.
    TransientError,
    /// The endpoint answered something this tool does not understand.
    FatalError,
}

impl Verdict {
    /// Whether this verdict lands in the error bucket.
    #[must_use]
    pub fn is_error(self) -> bool {
        !matches!(self, Self::Available | Self::Taken)
    }
}

/// The single terminal outcome produced for a candidate.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The candidate, with its source index.
    pub candidate: Candidate,
    /// Terminal classification.
    pub verdict: Verdict,
    /// Round trips made for this candidate (1 when the first try settled it).
    pub attempts: u32,
    /// Diagnostic detail for error verdicts.
    pub detail: Option<String>,
}

/// Point-in-time view of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Candidates with a terminal outcome so far.
    pub checked: u64,
    /// Terminal available outcomes.
    pub available: u64,
    /// Terminal taken outcomes.
    pub taken: u64,
    /// Terminal error outcomes.
    pub errors: u64,
    /// Retries scheduled across all candidates.
    pub retried: u64,
}

#[derive(Debug, Default)]
struct Stats {
    checked: AtomicU64,
    available: AtomicU64,
    taken: AtomicU64,
    errors: AtomicU64,
    retried: AtomicU64,
}

impl Stats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            checked: self.checked.load(Ordering::Relaxed),
            available: self.available.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }

    fn record(&self, verdict: Verdict) {
        self.checked.fetch_add(1, Ordering::Relaxed);
        let bucket = match verdict {
            Verdict::Available => &self.available,
            Verdict::Taken => &self.taken,
            _ => &self.errors,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }
}

/// Hook invoked on every per-candidate state transition.
///
/// Implementations render progress, feed the session log, or record events
/// in tests; the engine itself never produces output. Calls arrive from
/// worker threads ([`attempt_started`](Observer::attempt_started),
/// [`retrying`](Observer::retrying)) and from the aggregating thread
/// ([`finished`](Observer::finished)).
pub trait Observer: Sync {
    /// A round trip for `candidate` is about to start (`attempt` starts at 0).
    fn attempt_started(&self, _candidate: &Candidate, _attempt: u32, _stats: StatsSnapshot) {}

    /// Attempt `attempt` failed retryably; the worker waits `delay` before
    /// the next try.
    fn retrying(
        &self,
        _candidate: &Candidate,
        _attempt: u32,
        _delay: Duration,
        _stats: StatsSnapshot,
    ) {
    }

    /// A candidate reached its terminal outcome and was counted.
    fn finished(&self, _outcome: &Outcome, _stats: StatsSnapshot) {}
}

/// An [`Observer`] that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Result of one full run.
#[derive(Debug)]
pub struct Summary {
    /// Available candidates, in input order.
    pub available: Vec<Candidate>,
    /// Taken candidates, in input order.
    pub taken: Vec<Candidate>,
    /// Error outcomes, in input order.
    pub errors: Vec<Outcome>,
    /// Final counter values.
    pub stats: StatsSnapshot,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Whether the run was cut short by a cancel request.
    pub interrupted: bool,
}

/// The bounded worker pool.
///
/// Generic over the check implementation so tests can drive the retry
/// machinery with a scripted fake instead of the network.
#[derive(Debug)]
pub struct Engine<C> {
    client: C,
    threads: usize,
    retries: u32,
    base_delay: Duration,
    cancel: Arc<AtomicBool>,
}

impl<C: AvailabilityCheck> Engine<C> {
    /// Build an engine from a validated configuration.
    #[must_use]
    pub fn new(client: C, config: &Config) -> Self {
        Self {
            client,
            threads: config.threads,
            retries: config.retries,
            base_delay: config.retry_delay(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared cancel flag. Setting it stops workers from dequeuing new
    /// candidates and interrupts in-flight backoff waits; outcomes already
    /// aggregated are still returned in the [`Summary`].
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Check every candidate to a terminal outcome.
    ///
    /// Spawns `threads` workers over a shared queue, aggregates their
    /// outcomes on the calling thread, and returns the partitioned result
    /// with the available/taken/error buckets sorted back into input order.
    pub fn run(&self, candidates: Vec<Candidate>, observer: &dyn Observer) -> Summary {
        let start = Instant::now();
        let queue: Mutex<VecDeque<Candidate>> = Mutex::new(candidates.into());
        let stats = Stats::default();
        let (tx, rx) = mpsc::channel::<Outcome>();

        let mut available = Vec::new();
        let mut taken = Vec::new();
        let mut errors = Vec::new();

        thread::scope(|s| {
            for _ in 0..self.threads {
                let tx = tx.clone();
                let queue = &queue;
                let stats = &stats;
                s.spawn(move || self.worker(queue, &tx, stats, observer));
            }
            // Only workers hold senders now; the loop below ends when the
            // last worker exits.
            drop(tx);

            for outcome in rx {
                stats.record(outcome.verdict);
                observer.finished(&outcome, stats.snapshot());
                match outcome.verdict {
                    Verdict::Available => available.push(outcome.candidate),
                    Verdict::Taken => taken.push(outcome.candidate),
                    _ => errors.push(outcome),
                }
            }
        });

        available.sort_by_key(|c| c.index);
        taken.sort_by_key(|c| c.index);
        errors.sort_by_key(|o| o.candidate.index);

        Summary {
            available,
            taken,
            errors,
            stats: stats.snapshot(),
            elapsed: start.elapsed(),
            interrupted: self.cancelled(),
        }
    }

    fn worker(
        &self,
        queue: &Mutex<VecDeque<Candidate>>,
        tx: &mpsc::Sender<Outcome>,
        stats: &Stats,
        observer: &dyn Observer,
    ) {
        loop {
            if self.cancelled() {
                return;
            }
            let Some(candidate) = queue.lock().unwrap().pop_front() else {
                return;
            };
            let outcome = self.check_one(candidate, stats, observer);
            if tx.send(outcome).is_err() {
                return;
            }
        }
    }

    /// Drive one candidate's retry loop to a terminal outcome. All retry
    /// state is local to this call; attempts are strictly sequential.
    fn check_one(&self, candidate: Candidate, stats: &Stats, observer: &dyn Observer) -> Outcome {
        let mut attempt: u32 = 0;
        loop {
            if self.cancelled() {
                return interrupted(candidate, attempt);
            }

            observer.attempt_started(&candidate, attempt, stats.snapshot());
            let raw = self.client.check(&candidate.name);
            let attempts = attempt + 1;

            match raw {
                RawCheck::Available => {
                    return Outcome {
                        candidate,
                        verdict: Verdict::Available,
                        attempts,
                        detail: None,
                    };
                }
                RawCheck::Taken => {
                    return Outcome {
                        candidate,
                        verdict: Verdict::Taken,
                        attempts,
                        detail: None,
                    };
                }
                RawCheck::Fatal(msg) => {
                    return Outcome {
                        candidate,
                        verdict: Verdict::FatalError,
                        attempts,
                        detail: Some(msg),
                    };
                }
                RawCheck::RateLimited | RawCheck::Transient(_) if attempt < self.retries => {
                    stats.retried.fetch_add(1, Ordering::Relaxed);
                    let delay = next_delay(self.base_delay, attempt);
                    observer.retrying(&candidate, attempt, delay, stats.snapshot());
                    if !self.wait(delay) {
                        return interrupted(candidate, attempts);
                    }
                    attempt += 1;
                }
                RawCheck::RateLimited => {
                    return Outcome {
                        candidate,
                        verdict: Verdict::RateLimited,
                        attempts,
                        detail: Some(format!("still rate limited after {attempts} attempts")),
                    };
                }
                RawCheck::Transient(msg) => {
                    return Outcome {
                        candidate,
                        verdict: Verdict::TransientError,
                        attempts,
                        detail: Some(msg),
                    };
                }
            }
        }
    }

    /// Sleep for `delay` in small slices. Returns false if cancelled.
    fn wait(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(WAIT_SLICE));
        }
    }
}

fn interrupted(candidate: Candidate, attempts: u32) -> Outcome {
    Outcome {
        candidate,
        verdict: Verdict::TransientError,
        attempts,
        detail: Some("interrupted".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// Scripted check responses per name, falling back to `Available`
    /// once (or when) a script runs dry.
    struct Scripted {
        scripts: Mutex<HashMap<String, VecDeque<RawCheck>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new<const N: usize>(scripts: [(&str, Vec<RawCheck>); N]) -> Self {
            Self {
                scripts: Mutex::new(
                    scripts
                        .into_iter()
                        .map(|(name, seq)| (name.to_string(), seq.into()))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    impl AvailabilityCheck for Scripted {
        fn check(&self, username: &str) -> RawCheck {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.scripts
                .lock()
                .unwrap()
                .get_mut(username)
                .and_then(VecDeque::pop_front)
                .unwrap_or(RawCheck::Available)
        }
    }

    fn test_config(threads: usize, retries: u32) -> Config {
        Config {
            threads,
            retries,
            retry_delay: 0.0,
            ..Config::default()
        }
    }

    fn candidates(names: &[&str]) -> Vec<Candidate> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| Candidate {
                name: (*name).to_string(),
                index,
            })
            .collect()
    }

    fn names(bucket: &[Candidate]) -> Vec<&str> {
        bucket.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn always_rate_limited_attempts_exactly_retries_plus_one() {
        let client = Scripted::new([("alpha", vec![RawCheck::RateLimited; 10])]);
        let engine = Engine::new(&client, &test_config(1, 2));

        let summary = engine.run(candidates(&["alpha"]), &NoopObserver);

        assert_eq!(client.calls(), 3);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].verdict, Verdict::RateLimited);
        assert_eq!(summary.errors[0].attempts, 3);
        assert_eq!(summary.stats.retried, 2);
    }

    #[test]
    fn fatal_error_never_retries() {
        let client = Scripted::new([("alpha", vec![RawCheck::Fatal("HTTP 500".into())])]);
        let engine = Engine::new(&client, &test_config(1, 5));

        let summary = engine.run(candidates(&["alpha"]), &NoopObserver);

        assert_eq!(client.calls(), 1);
        assert_eq!(summary.errors[0].verdict, Verdict::FatalError);
        assert_eq!(summary.errors[0].detail.as_deref(), Some("HTTP 500"));
        assert_eq!(summary.stats.retried, 0);
    }

    #[test]
    fn transient_then_success_recovers() {
        let client = Scripted::new([(
            "alpha",
            vec![RawCheck::Transient("reset".into()), RawCheck::Available],
        )]);
        let engine = Engine::new(&client, &test_config(1, 5));

        let summary = engine.run(candidates(&["alpha"]), &NoopObserver);

        assert_eq!(names(&summary.available), ["alpha"]);
        assert_eq!(summary.stats.retried, 1);
        assert_eq!(summary.stats.errors, 0);
    }

    #[test]
    fn exhausted_transient_carries_last_message() {
        let client = Scripted::new([(
            "alpha",
            vec![
                RawCheck::Transient("first".into()),
                RawCheck::Transient("last".into()),
            ],
        )]);
        let engine = Engine::new(&client, &test_config(1, 1));

        let summary = engine.run(candidates(&["alpha"]), &NoopObserver);

        assert_eq!(summary.errors[0].verdict, Verdict::TransientError);
        assert_eq!(summary.errors[0].detail.as_deref(), Some("last"));
        assert_eq!(summary.errors[0].attempts, 2);
    }

    #[test]
    fn buckets_preserve_input_order() {
        // Candidate #2 taken, #4 available after one rate-limited retry,
        // the rest available on the first try.
        let client = Scripted::new([
            ("second", vec![RawCheck::Taken]),
            ("fourth", vec![RawCheck::RateLimited, RawCheck::Available]),
        ]);
        let engine = Engine::new(&client, &test_config(3, 5));

        let input = candidates(&["first", "second", "third", "fourth", "fifth"]);
        let summary = engine.run(input, &NoopObserver);

        assert_eq!(names(&summary.available), ["first", "third", "fourth", "fifth"]);
        assert_eq!(names(&summary.taken), ["second"]);
        assert!(summary.errors.is_empty());
        assert_eq!(summary.stats.retried, 1);
        assert_eq!(summary.stats.checked, 5);
    }

    #[test]
    fn concurrent_outcomes_are_counted_exactly_once() {
        let client = Scripted::new([]);
        let engine = Engine::new(&client, &test_config(8, 0));

        let names: Vec<String> = (0..100).map(|i| format!("user_{i:03}")).collect();
        let input = candidates(&names.iter().map(String::as_str).collect::<Vec<_>>());
        let summary = engine.run(input, &NoopObserver);

        assert_eq!(summary.stats.checked, 100);
        assert_eq!(summary.stats.available, 100);
        assert_eq!(summary.available.len(), 100);
        // Sorted back into input order despite arbitrary completion order.
        let indices: Vec<usize> = summary.available.iter().map(|c| c.index).collect();
        assert_eq!(indices, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn cancel_before_run_processes_nothing() {
        let client = Scripted::new([]);
        let engine = Engine::new(&client, &test_config(2, 0));
        engine.cancel_flag().store(true, Ordering::Relaxed);

        let summary = engine.run(candidates(&["alpha", "beta"]), &NoopObserver);

        assert!(summary.interrupted);
        assert_eq!(summary.stats.checked, 0);
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn cancel_interrupts_backoff_wait() {
        struct CancelOnRetry(Arc<AtomicBool>);
        impl Observer for CancelOnRetry {
            fn retrying(&self, _: &Candidate, _: u32, _: Duration, _: StatsSnapshot) {
                self.0.store(true, Ordering::Relaxed);
            }
        }

        let client = Scripted::new([("alpha", vec![RawCheck::RateLimited; 10])]);
        let config = Config {
            threads: 1,
            retries: 5,
            retry_delay: 30.0,
            ..Config::default()
        };
        let engine = Engine::new(&client, &config);
        let observer = CancelOnRetry(engine.cancel_flag());

        let start = Instant::now();
        let summary = engine.run(candidates(&["alpha"]), &observer);

        // Must not sleep out the 30 s backoff.
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(summary.interrupted);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].detail.as_deref(), Some("interrupted"));
    }

    #[test]
    fn observer_sees_every_transition() {
        #[derive(Default)]
        struct Recorder {
            events: Mutex<Vec<String>>,
        }
        impl Observer for Recorder {
            fn attempt_started(&self, c: &Candidate, attempt: u32, _: StatsSnapshot) {
                self.events.lock().unwrap().push(format!("start {} {attempt}", c.name));
            }
            fn retrying(&self, c: &Candidate, attempt: u32, _: Duration, _: StatsSnapshot) {
                self.events.lock().unwrap().push(format!("retry {} {attempt}", c.name));
            }
            fn finished(&self, o: &Outcome, stats: StatsSnapshot) {
                self.events
                    .lock()
                    .unwrap()
                    .push(format!("done {} {:?} {}", o.candidate.name, o.verdict, stats.checked));
            }
        }

        let client = Scripted::new([("alpha", vec![RawCheck::RateLimited, RawCheck::Taken])]);
        let engine = Engine::new(&client, &test_config(1, 5));
        let recorder = Recorder::default();

        engine.run(candidates(&["alpha"]), &recorder);

        let events = recorder.events.into_inner().unwrap();
        assert_eq!(
            events,
            [
                "start alpha 0",
                "retry alpha 0",
                "start alpha 1",
                "done alpha Taken 1",
            ]
        );
    }
}
