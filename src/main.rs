// AuctionIO binary - runs the scheduler headless with a line-oriented front end
//
// The binary builds a Tokio runtime, starts the scheduler loop, reads commands from stdin, and
// prints one line (or one JSON document) per published snapshot until Ctrl+C or `quit`.

use auction_io::{Command, Scheduler, SchedulerSnapshot, SimulationConfig};
use std::io::{BufRead, Write};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line options parsed from program arguments.
#[derive(Debug, Default)]
struct CliOptions {
    /// Optional JSON configuration file; CLI flags override its values.
    config: Option<String>,
    hosts: Option<usize>,
    tick_ms: Option<u64>,
    seed: Option<u64>,
    /// Clients generated before the first tick.
    initial_clients: usize,
    /// Generate one client every N ticks (0 disables).
    auto_generate: Option<u64>,
    /// Emit snapshots as JSON lines instead of the text summary.
    json: bool,
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value for {key}: {value:?}"))
}

fn apply_option(options: &mut CliOptions, key: &str, value: &str) -> Result<(), String> {
    match key {
        "--config" => options.config = Some(value.to_string()),
        "--hosts" => options.hosts = Some(parse_number(key, value)?),
        "--tick-ms" => options.tick_ms = Some(parse_number(key, value)?),
        "--seed" => options.seed = Some(parse_number(key, value)?),
        "--clients" => options.initial_clients = parse_number(key, value)?,
        "--auto-generate" => options.auto_generate = Some(parse_number(key, value)?),
        _ => return Err(format!("unknown option {key}")),
    }
    Ok(())
}

/// Parse command-line arguments into `CliOptions`.
///
/// Accepts both `--key=value` and `--key value`. `--json` takes no value.
fn parse_cli_options(args: impl IntoIterator<Item = String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--json" {
            options.json = true;
        } else if let Some((key, value)) = arg.split_once('=') {
            apply_option(&mut options, key, value)?;
        } else {
            let value = args
                .next()
                .ok_or_else(|| format!("missing value for {arg}"))?;
            apply_option(&mut options, &arg, &value)?;
        }
    }
    Ok(options)
}

fn build_config(options: &CliOptions) -> Result<SimulationConfig, Box<dyn std::error::Error>> {
    let mut config = match &options.config {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(hosts) = options.hosts {
        config.host_count = hosts;
    }
    if let Some(tick_ms) = options.tick_ms {
        config.clock.initial_tick_ms = tick_ms;
    }
    if options.seed.is_some() {
        config.generator.seed = options.seed;
    }
    if let Some(every) = options.auto_generate {
        config.auto_generate_every = every;
    }
    config.validate()?;
    Ok(config)
}

/// Translate one stdin line into a scheduler command.
///
/// `g`/`generate`, `+`/`speed-up`, `-`/`slow-down`, `i <sizes...>`/`insert <sizes...>`,
/// `q`/`quit`. Blank lines yield `Ok(None)`.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let command = match word {
        "g" | "generate" | "generate-client" => Command::GenerateClient,
        "+" | "speed-up" | "faster" => Command::SpeedUp,
        "-" | "slow-down" | "slower" => Command::SlowDown,
        "q" | "quit" | "exit" => Command::Shutdown,
        "i" | "insert" => {
            let mut files = words
                .map(|size| parse_number::<u32>("file size", size))
                .collect::<Result<Vec<_>, _>>()?;
            files.sort_unstable();
            Command::InsertClient(files)
        }
        other => return Err(format!("unknown command {other:?}")),
    };
    Ok(Some(command))
}

/// One-line summary of a snapshot for the text front end.
fn render_line(snapshot: &SchedulerSnapshot) -> String {
    let hosts: Vec<String> = snapshot
        .hosts
        .iter()
        .map(|host| match host.client {
            Some(client) => format!("[{} {:>3}% c{}]", host.id, host.percent, client),
            None => format!("[{} idle]", host.id),
        })
        .collect();
    let leader = snapshot
        .clients
        .iter()
        .fold(None::<&auction_io::snapshot::ClientSnapshot>, |best, client| {
            match best {
                Some(current) if client.coefficient <= current.coefficient => best,
                _ => Some(client),
            }
        })
        .map(|client| format!(" | next c{} ({:.4})", client.id, client.coefficient))
        .unwrap_or_default();
    format!(
        "tick {} | {} | clients {} | {}{}",
        snapshot.tick,
        snapshot.wall_clock,
        snapshot.queued_clients,
        hosts.join(" "),
        leader
    )
}

/// Main entry point for the scheduler binary.
///
/// This function:
/// 1. Initializes logging (`RUST_LOG`, default `info`, written to stderr)
/// 2. Parses command-line arguments and builds the configuration
/// 3. Spawns a stdin reader forwarding commands to the scheduler
/// 4. Spawns a renderer thread printing each published snapshot
/// 5. Runs the scheduler loop until Ctrl+C or `quit`
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = parse_cli_options(std::env::args().skip(1))?;
    let config = build_config(&options)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let mut scheduler = Scheduler::new(config)?;
    for _ in 0..options.initial_clients {
        scheduler.generate_client()?;
    }
    let handle = scheduler.handle();

    // Handle Ctrl+C
    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || {
        ctrlc_handle.shutdown();
    })?;

    // Stdin commands. EOF stops reading but keeps the simulation running.
    let input_handle = handle.clone();
    std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if input_handle.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(reason) => warn!(%reason, "ignored input"),
                }
            }
        })?;

    let render_handle = handle.clone();
    let json = options.json;
    let renderer = std::thread::Builder::new()
        .name("renderer".to_string())
        .spawn(move || {
            let stdout = std::io::stdout();
            let receiver = render_handle.snapshots().receiver().clone();
            while render_handle.is_running() {
                let Ok(snapshot) = receiver.recv_timeout(Duration::from_millis(200)) else {
                    continue;
                };
                let line = if json {
                    match serde_json::to_string(snapshot.as_ref()) {
                        Ok(line) => line,
                        Err(e) => {
                            error!(error = %e, "failed to serialize snapshot");
                            continue;
                        }
                    }
                } else {
                    render_line(&snapshot)
                };
                if writeln!(stdout.lock(), "{line}").is_err() {
                    break;
                }
            }
        })?;

    let result = rt.block_on(scheduler.run());
    handle.shutdown();
    let _ = renderer.join();

    // In-flight uploads are abandoned with the runtime.
    rt.shutdown_timeout(Duration::from_millis(100));

    if let Some(snapshot) = handle.snapshots().latest() {
        info!(
            ticks = snapshot.tick,
            admitted = snapshot.stats.clients_admitted,
            served = snapshot.stats.clients_served,
            files = snapshot.stats.files_dispatched,
            "simulation finished"
        );
    }
    result?;
    Ok(())
}
