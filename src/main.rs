//! agentdeck - terminal dashboard for multi-agent task execution
//!
//! USAGE:
//!   producer | agentdeck          # JSON-lines events on stdin
//!   agentdeck --demo              # simulated backend
//!   agentdeck --split 0.5         # agent/log split override
//!   agentdeck --no-logs           # start with the log panel hidden

use agentdeck::{demo, ingest, runtime, ui, Bridge, Dashboard, DashboardConfig};
use anyhow::{Context, Result};
use std::io::{self, IsTerminal};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ═══════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, PartialEq)]
enum Command {
    Run {
        demo: bool,
        split: Option<f64>,
        no_logs: bool,
    },
    Help,
    Version,
}

fn parse_args(args: &[String]) -> Result<Command> {
    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Ok(Command::Help);
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        return Ok(Command::Version);
    }

    let mut demo = false;
    let mut split = None;
    let mut no_logs = false;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--demo" | "-d" => demo = true,
            "--no-logs" => no_logs = true,
            "--split" | "-s" => {
                i += 1;
                let raw = args.get(i).context("--split needs a value")?;
                let value: f64 = raw
                    .parse()
                    .with_context(|| format!("invalid --split value: {}", raw))?;
                split = Some(value);
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
        i += 1;
    }

    Ok(Command::Run { demo, split, no_logs })
}

fn print_help() {
    println!(r#"agentdeck - terminal dashboard for multi-agent task execution

USAGE:
    producer | agentdeck [FLAGS]   # read JSON-lines events from stdin
    agentdeck --demo [FLAGS]       # run against a simulated backend

FLAGS:
    -d, --demo              Simulated workflow, loop and agents
    -s, --split <0..1>      Fraction of content height for the agent panel
        --no-logs           Start with the log panel hidden
    -h, --help              Show this help
    -V, --version           Show version

INPUT (one JSON object per line, "feed" selects the channel):
    {{"feed":"workflow","workflow_id":"w1","workflow_name":"ship","event":"started","step":"plan"}}
    {{"feed":"loop","kind":"task_started","task_id":"T-1","iteration":1,"max_iter":5}}
    {{"feed":"loop","kind":"rate_limit_wait","provider":"anthropic","wait":30}}
    {{"feed":"output","agent":"claude","line":"...","stream":"stderr"}}
    {{"feed":"status","agent":"claude","status":"running","task":"T-1"}}
    {{"feed":"progress","completed":3,"total":8,"phase":1,"total_phases":2}}

CONFIG:
    ~/.config/agentdeck/config.json    log_capacity, output_capacity,
                                       agent_split, show_logs, tick_ms

ENVIRONMENT:
    AGENTDECK_LOG_CAPACITY, AGENTDECK_OUTPUT_CAPACITY,
    AGENTDECK_AGENT_SPLIT, AGENTDECK_SHOW_LOGS   Override config values
    AGENTDECK_LOG_STDERR=1                       Write diagnostics to stderr
    RUST_LOG                                     Diagnostic filter (default: info)

KEYS:
    q / Ctrl-C   Quit            ?   Help
    p            Pause/resume    s   Skip task
    l            Toggle logs     1 2 3  Focus panel
    Tab          Next agent / panel
"#);
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_enabled = std::env::var("AGENTDECK_LOG_STDERR")
        .ok()
        .as_deref()
        .and_then(agentdeck::config::parse_bool)
        .unwrap_or(false);
    if stderr_enabled {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}

// ═══════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            println!("agentdeck {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Run { demo, split, no_logs } => {
            init_logging();
            run_dashboard(demo, split, no_logs).await
        }
    }
}

async fn run_dashboard(use_demo: bool, split: Option<f64>, no_logs: bool) -> Result<()> {
    let mut cfg = DashboardConfig::load().context("loading configuration")?;
    if let Some(split) = split {
        cfg.agent_split = agentdeck::layout::sanitize_split(split);
    }
    if no_logs {
        cfg.show_logs = false;
    }

    let cancel = CancellationToken::new();
    let (mut bridge, control): (Bridge, _) = if use_demo {
        let demo = demo::start(cancel.clone(), demo::DemoOptions::default());
        (demo.bridge, Some(demo.control))
    } else {
        if io::stdin().is_terminal() {
            anyhow::bail!("no event source: pipe JSON-lines events on stdin, or pass --demo");
        }
        let (bridge, _reader) = ingest::start(BufReader::new(tokio::io::stdin()), cancel.clone());
        (bridge, None)
    };

    info!(demo = use_demo, split = cfg.agent_split, "starting agentdeck");
    let mut dashboard = Dashboard::new(&cfg);
    let mut terminal = ui::setup_terminal().context("setting up terminal")?;

    let result = runtime::run(&mut terminal, &mut dashboard, &mut bridge, cancel, control).await;

    ui::restore_terminal(terminal).context("restoring terminal")?;
    result
}
