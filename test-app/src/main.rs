// riglink test application -- CLI tool for exercising the Icom network
// protocol engine against a real radio on the LAN.
//
// Usage:
//   riglink-test-app --host 192.168.1.50 --user w1aw --pass secret connect
//   riglink-test-app --host 192.168.1.50 --user w1aw --pass secret connect --seconds 30
//   riglink-test-app --host 192.168.1.50 --user w1aw --pass secret monitor --duration 60
//   riglink-test-app --host 192.168.1.50 --user w1aw --pass secret audio --duration 10
//
// Set RUST_LOG (e.g. RUST_LOG=riglink_icom=trace) for finer control than
// --verbose gives.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use riglink_core::{AudioStreamConfig, Channel, ChannelAudioPipeline, ChannelStatus};
use riglink_icom::{RemoteSession, SessionBuilder};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// riglink test application -- drives an Icom radio's network protocol.
#[derive(Parser)]
#[command(name = "riglink-test-app", version, about)]
struct Cli {
    /// Radio host name or IP address.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Network user name configured on the radio.
    #[arg(long, global = true, default_value = "")]
    user: String,

    /// Network password configured on the radio.
    #[arg(long, global = true, default_value = "")]
    pass: String,

    /// Name announced to the radio at login.
    #[arg(long, global = true, default_value = "riglink")]
    client_name: String,

    /// Control channel port.
    #[arg(long, global = true, default_value_t = 50001)]
    control_port: u16,

    /// CI-V channel port.
    #[arg(long, global = true, default_value_t = 50002)]
    civ_port: u16,

    /// Audio channel port.
    #[arg(long, global = true, default_value_t = 50003)]
    audio_port: u16,

    /// Channels to open, comma separated (control, civ, audio).
    #[arg(long, global = true, value_delimiter = ',', default_value = "control,civ,audio")]
    channels: Vec<Channel>,

    /// Seconds to wait for every channel to finish its handshake.
    #[arg(long, global = true, default_value_t = 10)]
    establish_timeout: u64,

    /// Log at debug level instead of info.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, print per-channel status once a second, then disconnect.
    Connect {
        /// How long to stay connected (0 = until Ctrl-C).
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },

    /// Print link events as they happen.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Report RX audio levels from the audio channel.
    Audio {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 10)]
        duration: u64,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn builder(cli: &Cli) -> Result<SessionBuilder> {
    let Some(host) = cli.host.as_deref() else {
        bail!("--host is required");
    };
    Ok(SessionBuilder::new(host)
        .credentials(&cli.user, &cli.pass)
        .client_name(&cli.client_name)
        .control_port(cli.control_port)
        .civ_port(cli.civ_port)
        .audio_port(cli.audio_port)
        .channels(&cli.channels))
}

/// Sleep for `duration`, or until Ctrl-C when it is zero. Returns early on
/// Ctrl-C either way.
async fn run_for(duration: Duration) {
    if duration.is_zero() {
        let _ = tokio::signal::ctrl_c().await;
    } else {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
}

fn format_rtt(rtt: Option<Duration>) -> String {
    match rtt {
        Some(d) => format!("{:.1} ms", d.as_secs_f64() * 1000.0),
        None => "-".to_string(),
    }
}

fn print_status(statuses: &[ChannelStatus]) {
    println!(
        "{:<8} {:<18} {:>5} {:>5} {:>10} {:>10} {:>7} {:>8} {:>8}",
        "channel", "state", "auth", "dead", "their id", "rtt", "resets", "retrans", "dropped"
    );
    for s in statuses {
        let their = s
            .their_identifier
            .map(|id| format!("{id:#010x}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<18} {:>5} {:>5} {:>10} {:>10} {:>7} {:>8} {:>8}",
            s.channel.to_string(),
            s.state.to_string(),
            s.authenticated,
            s.dead,
            their,
            format_rtt(s.round_trip),
            s.resets,
            s.retransmits,
            s.audio_dropped,
        );
    }
}

async fn wait_established(session: &RemoteSession, secs: u64) -> Result<()> {
    let started = Instant::now();
    session
        .wait_established(Duration::from_secs(secs))
        .await
        .with_context(|| format!("channels not established within {secs}s"))?;
    println!("Established in {:.0?}.", started.elapsed());
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_connect(cli: &Cli, seconds: u64) -> Result<()> {
    let session = builder(cli)?.build().await?;
    println!(
        "Connecting to {} as {:#010x}...",
        cli.host.as_deref().unwrap_or_default(),
        session.our_identifier()
    );
    let result = connect_loop(cli, &session, seconds).await;
    session.stop().await?;
    result
}

async fn connect_loop(cli: &Cli, session: &RemoteSession, seconds: u64) -> Result<()> {
    wait_established(session, cli.establish_timeout).await?;
    let deadline = (seconds > 0).then(|| Instant::now() + Duration::from_secs(seconds));

    loop {
        print_status(&session.statuses().await?);
        println!();
        let tick = tokio::time::sleep(Duration::from_secs(1));
        tokio::select! {
            _ = tick => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        if deadline.is_some_and(|dl| Instant::now() >= dl) {
            break;
        }
    }
    print_status(&session.statuses().await?);
    Ok(())
}

async fn cmd_monitor(cli: &Cli, duration_secs: u64) -> Result<()> {
    let session = builder(cli)?.build().await?;
    let mut event_rx = session.subscribe();

    println!("Monitoring link events (Ctrl-C to stop)...");

    let watch = async {
        loop {
            match event_rx.recv().await {
                Ok(event) => println!("[event] {event:?}"),
                Err(RecvError::Lagged(n)) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Err(RecvError::Closed) => {
                    println!("Event channel closed.");
                    break;
                }
            }
        }
    };
    tokio::select! {
        _ = watch => {}
        _ = run_for(Duration::from_secs(duration_secs)) => {
            println!("Monitor finished.");
        }
    }

    session.stop().await?;
    Ok(())
}

async fn cmd_audio(cli: &Cli, duration_secs: u64) -> Result<()> {
    if !cli.channels.contains(&Channel::Audio) {
        bail!("the audio command needs the audio channel (see --channels)");
    }
    let config = AudioStreamConfig::default();
    let (pipeline, _tx, mut rx) = ChannelAudioPipeline::new(config, 64);
    let session = builder(cli)?.audio_pipeline(pipeline).build().await?;

    let result = async {
        wait_established(&session, cli.establish_timeout).await?;
        println!(
            "Receiving audio at {} Hz, {} channel(s) (Ctrl-C to stop)...",
            config.sample_rate, config.channels
        );

        let mut blocks = 0u64;
        let mut peak = 0i32;
        let mut sum_sq = 0f64;
        let mut samples = 0u64;
        let mut last_report = Instant::now();

        let meter = async {
            while let Some(block) = rx.recv().await {
                blocks += 1;
                for &s in &block.samples {
                    peak = peak.max(i32::from(s).abs());
                    sum_sq += f64::from(s) * f64::from(s);
                    samples += 1;
                }
                if last_report.elapsed() >= Duration::from_secs(1) {
                    let rms = if samples > 0 {
                        (sum_sq / samples as f64).sqrt()
                    } else {
                        0.0
                    };
                    println!("blocks {blocks:>6}  peak {peak:>6}  rms {rms:>8.1}");
                    peak = 0;
                    sum_sq = 0.0;
                    samples = 0;
                    last_report = Instant::now();
                }
            }
        };
        tokio::select! {
            _ = meter => println!("Audio stream closed."),
            _ = run_for(Duration::from_secs(duration_secs)) => {}
        }
        let status = session.status(Channel::Audio).await?;
        println!(
            "Done: {} frames dropped as stale, rtt {}.",
            status.audio_dropped,
            format_rtt(status.round_trip)
        );
        Ok::<(), anyhow::Error>(())
    }
    .await;

    session.stop().await?;
    result
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.channels.is_empty() {
        bail!("--channels must name at least one channel");
    }

    match &cli.command {
        Command::Connect { seconds } => cmd_connect(&cli, *seconds).await,
        Command::Monitor { duration } => cmd_monitor(&cli, *duration).await,
        Command::Audio { duration } => cmd_audio(&cli, *duration).await,
    }
}
