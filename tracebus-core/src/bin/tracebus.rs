//! tracebus CLI - listen to or emit trace events
//!
//! Usage:
//!     tracebus listen --target 239.255.77.77:7777 --filter "10:disk*"
//!     tracebus listen --json --count 20
//!     tracebus emit --subsystem disk --level 3 --event read --summary "block 42"

use std::process;

use clap::{Parser, Subcommand};
use crossbeam::channel;
use tracebus_core::{SinkSettings, TracePacket, TraceSettings, TraceSink, Tracer, DEFAULT_TARGET};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tracebus")]
#[command(about = "Diagnostic trace bus over UDP")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print trace events received on an endpoint
    Listen {
        /// Endpoint to listen on
        #[arg(short, long, default_value = DEFAULT_TARGET)]
        target: String,

        /// Interface address used to join multicast groups
        #[arg(short, long)]
        adapter: Option<String>,

        /// Interest rule `<max>:<pattern>`; may be repeated
        #[arg(short, long)]
        filter: Vec<String>,

        /// Print each packet as a JSON line
        #[arg(long)]
        json: bool,

        /// Exit after this many packets
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Send trace events
    Emit {
        /// Endpoint to send to
        #[arg(short, long, default_value = DEFAULT_TARGET)]
        target: String,

        /// Interface address to send from
        #[arg(short, long)]
        adapter: Option<String>,

        #[arg(short, long)]
        subsystem: String,

        #[arg(short, long, default_value_t = 0)]
        level: u8,

        #[arg(short, long)]
        event: String,

        #[arg(long, default_value = "")]
        summary: String,

        #[arg(long, default_value = "")]
        details: String,

        /// Send the event this many times
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Print producer statistics as JSON when done
        #[arg(long)]
        stats: bool,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracebus_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let outcome = match args.command {
        Command::Listen {
            target,
            adapter,
            filter,
            json,
            count,
        } => listen(target, adapter, filter, json, count),
        Command::Emit {
            target,
            adapter,
            subsystem,
            level,
            event,
            summary,
            details,
            repeat,
            stats,
        } => emit(
            target, adapter, &subsystem, level, &event, &summary, &details, repeat, stats,
        ),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn listen(
    target: String,
    adapter: Option<String>,
    filter: Vec<String>,
    json: bool,
    count: Option<usize>,
) -> tracebus_core::Result<()> {
    let mut settings = SinkSettings::new(target);
    settings.adapter = adapter;
    settings.filter = filter;

    let sink = TraceSink::new(settings)?;
    let (tx, rx) = channel::unbounded::<TracePacket>();
    sink.start(move |batch| {
        for packet in batch {
            let _ = tx.send(packet.clone());
        }
    })?;

    if let Some(addr) = sink.local_addr() {
        eprintln!("Listening on {}", addr);
    }

    let mut printed = 0usize;
    for packet in rx.iter() {
        print_packet(&packet, json)?;
        printed += 1;
        if count.is_some_and(|limit| printed >= limit) {
            break;
        }
    }

    sink.stop();
    Ok(())
}

fn print_packet(packet: &TracePacket, json: bool) -> tracebus_core::Result<()> {
    if json {
        println!("{}", serde_json::to_string(packet)?);
        return Ok(());
    }

    let event = &packet.event;
    println!(
        "{} {} [{}:{}] {}: {}",
        packet.received_at.format("%H:%M:%S%.3f"),
        packet.source,
        event.subsystem,
        event.detail_level,
        event.event_name,
        event.summary
    );
    if !event.details.is_empty() {
        for line in event.details.lines() {
            println!("    {}", line);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit(
    target: String,
    adapter: Option<String>,
    subsystem: &str,
    level: u8,
    event: &str,
    summary: &str,
    details: &str,
    repeat: u32,
    stats: bool,
) -> tracebus_core::Result<()> {
    let mut settings = TraceSettings::new(target);
    settings.adapter = adapter;

    let tracer = Tracer::new();
    tracer.start(&settings)?;
    tracer.enable(subsystem, level)?;

    for _ in 0..repeat {
        tracer.write(subsystem, level, event, summary, details)?;
    }

    let snapshot = tracer.stats();
    tracer.stop();

    if stats {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    Ok(())
}
