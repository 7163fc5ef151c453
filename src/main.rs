//! hostpilot CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use hostpilot::agent::AgentRuntime;
use hostpilot::agent_loop::{AgentEvent, AgentEventPayload, AgentEventSink, TurnOutcome};
use hostpilot::bridge::{HostBridge, HostThread};
use hostpilot::cli::demo::{demo_registry, DemoDocument};
use hostpilot::cli::{ChatArgs, Cli, Commands};
use hostpilot::config::{EngineSettings, PilotConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Chat(chat_args) => handle_chat(chat_args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HOSTPILOT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = EngineSettings::resolve(args.config.as_deref())?;
    if let Some(model) = args.model {
        settings.model = model;
    }
    if let Some(system) = args.system {
        settings.system_prompt = Some(system);
    }
    if args.temperature.is_some() {
        settings.generation.temperature = args.temperature;
    }
    if args.max_tokens.is_some() {
        settings.generation.max_tokens = args.max_tokens;
    }
    if settings.system_prompt.is_none() {
        settings.system_prompt = Some(
            "You operate a parametric document. Use the tools to inspect and change its parameters."
                .to_string(),
        );
    }

    let config = PilotConfig::from_env();
    let (bridge, wakeup) = HostBridge::with_wake_channel(demo_registry());
    let bridge = Arc::new(bridge.with_timeout(settings.tool_timeout()));
    let host = HostThread::spawn(bridge.clone(), wakeup, DemoDocument::default())?;

    let runtime = AgentRuntime::from_settings(&settings, &config, bridge, Some(terminal_sink()))?;
    eprintln!("model {} | /reset starts a new session, /quit exits, Ctrl-C cancels", settings.model);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let _ = std::io::stderr().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                runtime.reset_session().await;
                eprintln!("(new session)");
                continue;
            }
            _ => {}
        }

        let mut turn = runtime.submit(line).await;
        let outcome = loop {
            tokio::select! {
                joined = &mut turn => break joined?,
                _ = tokio::signal::ctrl_c() => {
                    runtime.cancel().await;
                }
            }
        };
        println!();
        match outcome {
            TurnOutcome::Finalized(_) => {}
            TurnOutcome::Cancelled => eprintln!("(cancelled)"),
            TurnOutcome::Failed(message) => eprintln!("{}", message.text()),
        }
    }

    runtime.cancel().await;
    runtime.wait_for_idle().await;
    drop(runtime);
    if let Some(doc) = tokio::task::spawn_blocking(move || host.shutdown()).await? {
        for (name, value) in &doc.parameters {
            eprintln!("{name} = {value}");
        }
    }
    Ok(())
}

fn terminal_sink() -> AgentEventSink {
    Arc::new(|event: AgentEvent| match &event.payload {
        AgentEventPayload::TextReceived { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        AgentEventPayload::ToolExecuting { tool_name, call_id, .. } => {
            eprintln!("\n-> {tool_name} ({call_id})");
        }
        AgentEventPayload::ToolCompleted {
            result, duration_ms, ..
        } => {
            let mark = if result.success { "ok" } else { "failed" };
            eprintln!("   {mark} in {duration_ms}ms: {}", result.message);
        }
        _ => {}
    })
}
