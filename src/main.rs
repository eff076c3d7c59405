//! FlashPipe demo driver
//!
//! Spawns a number of producer threads, each running a short scripted session
//! against a Redis-compatible server through its own pipelined client.

use anyhow::{bail, Context};
use flashpipe::{Client, PipelineConfig, ReplyResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Demo configuration
struct Config {
    /// Server host
    host: String,
    /// Server port
    port: u16,
    /// Optional AUTH password
    password: Option<String>,
    /// Producer threads
    threads: usize,
    /// Sessions per thread
    rounds: usize,
    /// Pipeline capacity (0 = manual commit)
    capacity: usize,
    /// Pipeline timeout in milliseconds
    timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: flashpipe::DEFAULT_HOST.to_string(),
            port: flashpipe::DEFAULT_PORT,
            password: None,
            threads: 8,
            rounds: 10,
            capacity: 0,
            timeout_ms: 0,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            let mut value = || {
                args.next()
                    .with_context(|| format!("{} requires a value", arg))
            };
            match arg.as_str() {
                "--host" | "-h" => config.host = value()?,
                "--port" | "-p" => config.port = value()?.parse().context("invalid port number")?,
                "--password" | "-a" => config.password = Some(value()?),
                "--threads" | "-t" => config.threads = value()?.parse().context("invalid thread count")?,
                "--rounds" | "-r" => config.rounds = value()?.parse().context("invalid round count")?,
                "--capacity" | "-c" => config.capacity = value()?.parse().context("invalid capacity")?,
                "--timeout" => config.timeout_ms = value()?.parse().context("invalid timeout")?,
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("FlashPipe version {}", flashpipe::VERSION);
                    std::process::exit(0);
                }
                other => {
                    print_help();
                    bail!("unknown argument: {}", other);
                }
            }
        }

        Ok(config)
    }

    fn pipeline(&self) -> PipelineConfig {
        PipelineConfig::batched(self.capacity, Duration::from_millis(self.timeout_ms))
    }
}

fn print_help() {
    println!(
        r#"
FlashPipe - pipelined RESP client demo

USAGE:
    flashpipe [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Server host (default: 127.0.0.1)
    -p, --port <PORT>          Server port (default: 6379)
    -a, --password <PASS>      Send AUTH first
    -t, --threads <N>          Producer threads (default: 8)
    -r, --rounds <N>           Sessions per thread (default: 10)
    -c, --capacity <N>         Pipeline capacity, 0 = manual commit (default: 0)
        --timeout <MS>         Pipeline timeout in ms, 0 = none (default: 0)
    -v, --version              Print version information
        --help                 Print this help message
"#
    );
}

/// Counts replies and failures across all sessions.
#[derive(Default)]
struct Tally {
    replies: AtomicU64,
    failures: AtomicU64,
}

impl Tally {
    fn record(&self, id: usize, what: &'static str, result: &ReplyResult) {
        match result {
            Ok(reply) => {
                self.replies.fetch_add(1, Ordering::Relaxed);
                info!(session = id, command = what, reply = %reply, "Reply");
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(session = id, command = what, error = %e, "Command failed");
            }
        }
    }
}

/// One scripted session, mixing callbacks and futures.
fn session(id: usize, config: &Config, tally: &Arc<Tally>) -> anyhow::Result<()> {
    let client = Client::new(config.pipeline()).with_read_timeout(Duration::from_secs(5));
    if !client.connect(&config.host, config.port, 1500) {
        bail!("could not connect to {}:{}", config.host, config.port);
    }

    if let Some(password) = &config.password {
        let auth = client.request(["AUTH", password.as_str()]);
        client.commit();
        let reply = auth.wait()?;
        if !reply.is_ok() {
            bail!("AUTH rejected: {}", reply);
        }
    }

    let key = format!("foo{}", id);
    let callback = |what: &'static str| {
        let tally = Arc::clone(tally);
        move |result: ReplyResult| tally.record(id, what, &result)
    };

    client
        .send(["PING"], callback("PING"))
        .send(["SET", key.as_str(), "233 2333"], callback("SET"))
        .send(["GET", key.as_str()], callback("GET"))
        .send(["INCR", "counter"], callback("INCR"))
        .commit();

    let list = format!("mylist-{}", id);
    let del = client.request(["DEL", list.as_str()]);
    client.commit();
    del.wait()?;

    for i in 0..10 {
        let element = format!("element-{}", i);
        client.send(["LPUSH", list.as_str(), element.as_str()], callback("LPUSH"));
    }
    client
        .send(["LRANGE", list.as_str(), "0", "-1"], callback("LRANGE"))
        .commit();

    let ping = client.request(["PING"]);
    client.commit();
    let reply = ping.wait()?;
    if reply.as_status() != Some("PONG") {
        bail!("unexpected PING reply: {}", reply);
    }

    info!(session = id, "Done");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_args()?);

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_thread_names(true)
        .init();

    let tally = Arc::new(Tally::default());
    let started = Instant::now();

    let workers: Vec<_> = (0..config.threads)
        .map(|id| {
            let config = Arc::clone(&config);
            let tally = Arc::clone(&tally);
            thread::spawn(move || {
                for _ in 0..config.rounds {
                    if let Err(e) = session(id, &config, &tally) {
                        error!(session = id, error = %e, "Session failed");
                        return;
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        if worker.join().is_err() {
            error!("Producer thread panicked");
        }
    }

    println!(
        "{} replies, {} failures in {:?}",
        tally.replies.load(Ordering::Relaxed),
        tally.failures.load(Ordering::Relaxed),
        started.elapsed()
    );
    Ok(())
}
