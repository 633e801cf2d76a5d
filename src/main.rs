use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::json;

use hytale_avail::client::HttpClient;
use hytale_avail::config::Config;
use hytale_avail::engine::{Engine, Observer, Outcome, StatsSnapshot, Summary, Verdict};
use hytale_avail::session::SessionLog;
use hytale_avail::validate::{Candidate, collect_candidates};

#[derive(Parser)]
#[command(
    name = "hytale-avail",
    version,
    about = "Check Hytale username availability in bulk",
    after_help = "Reads one username per line (blank lines and # comments are \
                  skipped), validates against the Hytale rules (3-16 chars, \
                  letters/digits/underscore), drops case-insensitive duplicates, \
                  then checks the remaining names concurrently against the \
                  hytl.tools endpoint with exponential backoff on rate limits.\n\n\
                  Results land in <output-dir>/available.txt and taken.txt in \
                  input order; a session log is written under <log-dir>."
)]
struct Cli {
    /// File with one username per line (`-` or piped stdin reads stdin)
    input: Option<PathBuf>,

    /// JSON config file (defaults apply when the file is missing)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Directory for available.txt and taken.txt
    #[arg(long, default_value = "result")]
    output_dir: PathBuf,

    /// Directory for session log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Override worker thread count
    #[arg(long)]
    threads: Option<usize>,

    /// Override per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Override maximum retries per username
    #[arg(long)]
    retries: Option<u32>,

    /// Override base backoff delay in seconds
    #[arg(long)]
    retry_delay: Option<f64>,

    /// Verbose logging (session log and stderr diagnostics)
    #[arg(long)]
    debug: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.debug { "debug" } else { "warn" }),
    )
    .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load(&cli.config)?;
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout = timeout;
    }
    if let Some(retries) = cli.retries {
        config.retries = retries;
    }
    if let Some(retry_delay) = cli.retry_delay {
        config.retry_delay = retry_delay;
    }
    if cli.debug {
        config.debug = true;
    }
    config.validate()?;

    let lines = read_input(cli.input.as_deref())?;
    let set = collect_candidates(&lines);
    let total = set.candidates.len();

    if !cli.quiet {
        eprintln!(
            "  loaded {total} usernames ({} duplicates, {} invalid skipped)",
            set.duplicates, set.invalid
        );
        eprintln!("  using {} threads", config.threads);
    }
    if total == 0 {
        bail!("no valid usernames to check");
    }

    let log = SessionLog::create(&cli.log_dir, config.debug).context("creating session log")?;
    log.info(
        "Starting check session",
        Some(&json!({
            "total": total,
            "threads": config.threads,
            "timeout": config.timeout,
            "retries": config.retries,
        })),
    );

    let engine = Engine::new(HttpClient::new(config.timeout()), &config);
    let cancel = engine.cancel_flag();
    ctrlc::set_handler(move || {
        eprintln!("\n  interrupt received, finishing in-flight checks");
        cancel.store(true, Ordering::Relaxed);
    })
    .context("installing interrupt handler")?;

    let reporter = RunReporter {
        log: &log,
        total,
        start: Instant::now(),
        render: !cli.quiet && io::stderr().is_terminal(),
    };
    let summary = engine.run(set.candidates, &reporter);
    if reporter.render {
        eprintln!();
    }

    write_results(&cli.output_dir, &summary)
        .with_context(|| format!("writing results to `{}`", cli.output_dir.display()))?;
    log.summary(&summary.stats, summary.elapsed);

    if summary.interrupted {
        log.warn("Interrupted by user");
    }
    if !cli.quiet {
        print_summary(&summary, &cli.output_dir, log.path());
    }

    if summary.interrupted {
        Ok(ExitCode::from(130))
    } else if summary.stats.errors > 0 {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn read_input(path: Option<&Path>) -> Result<Vec<String>> {
    if let Some(path) = path.filter(|p| *p != Path::new("-")) {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading `{}`", path.display()))?;
        return Ok(text.lines().map(str::to_string).collect());
    }

    // `-` means stdin explicitly; a bare terminal stdin is a usage error.
    if path.is_none() && io::stdin().is_terminal() {
        bail!("no input file given and stdin is a terminal");
    }
    let mut lines = Vec::new();
    for line in io::stdin().lock().lines() {
        lines.push(line.context("reading stdin")?);
    }
    Ok(lines)
}

fn write_results(output_dir: &Path, summary: &Summary) -> io::Result<()> {
    fs::create_dir_all(output_dir)?;
    write_names(&output_dir.join("available.txt"), &summary.available)?;
    write_names(&output_dir.join("taken.txt"), &summary.taken)
}

fn write_names(path: &Path, candidates: &[Candidate]) -> io::Result<()> {
    let mut text = String::new();
    for candidate in candidates {
        text.push_str(&candidate.name);
        text.push('\n');
    }
    fs::write(path, text)
}

fn print_summary(summary: &Summary, output_dir: &Path, log_path: &Path) {
    let stats = &summary.stats;
    println!();
    println!("  {:>6}  available", stats.available);
    println!("  {:>6}  taken", stats.taken);
    println!("  {:>6}  errors", stats.errors);
    println!();
    println!("  completed in {:.2}s", summary.elapsed.as_secs_f64());
    println!("  results saved to {}", output_dir.display());
    println!("  session log: {}", log_path.display());
}

/// Feeds the session log and renders the live progress line.
struct RunReporter<'a> {
    log: &'a SessionLog,
    total: usize,
    start: Instant,
    render: bool,
}

impl RunReporter<'_> {
    fn progress(&self, stats: StatsSnapshot) {
        if !self.render || self.total == 0 {
            return;
        }
        let checked = stats.checked as usize;
        let pct = checked as f64 / self.total as f64 * 100.0;
        let filled = 20 * checked / self.total;
        let elapsed = self.start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            checked as f64 / elapsed
        } else {
            0.0
        };
        eprint!(
            "\r  [{}{}] {pct:5.1}%  {:>4} hit  {:>4} taken  {:>3} err  {rate:>5.1}/s",
            "#".repeat(filled),
            "-".repeat(20 - filled),
            stats.available,
            stats.taken,
            stats.errors,
        );
        let _ = io::stderr().flush();
    }
}

impl Observer for RunReporter<'_> {
    fn attempt_started(&self, candidate: &Candidate, attempt: u32, _stats: StatsSnapshot) {
        if attempt > 0 {
            self.log.debug(
                &format!("Attempt {} for {}", attempt + 1, candidate.name),
                None,
            );
        }
    }

    fn retrying(
        &self,
        candidate: &Candidate,
        attempt: u32,
        delay: Duration,
        _stats: StatsSnapshot,
    ) {
        self.log.warn(&format!(
            "Backing off {:.1}s before retrying {} (attempt {})",
            delay.as_secs_f64(),
            candidate.name,
            attempt + 1,
        ));
    }

    fn finished(&self, outcome: &Outcome, stats: StatsSnapshot) {
        let name = &outcome.candidate.name;
        match outcome.verdict {
            Verdict::Available => self.log.hit(name),
            Verdict::Taken => self.log.info(&format!("Taken: {name}"), None),
            verdict => self.log.error(
                &format!("Check failed for {name}"),
                Some(&json!({
                    "verdict": format!("{verdict:?}"),
                    "attempts": outcome.attempts,
                    "detail": outcome.detail,
                })),
            ),
        }
        self.progress(stats);
    }
}
