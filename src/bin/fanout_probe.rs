use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chorus_lib::bus::event_types::is_lifecycle_event;
use chorus_lib::bus::EventBus;
use chorus_lib::config::{EngineConfig, ServiceConfig};
use chorus_lib::model::{ChatMessage, GenerationSettings, ProviderId, ReasoningEffort, RequestEngine};
use chorus_lib::runtime::{
    AgentRun, AgentStatus, FanOutOrchestrator, FanOutRequest, SessionState, MAX_FANOUT_MEMBERS,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const DEFAULT_PROMPT: &str = "In two sentences, explain what a server-sent event stream is.";

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    chorus_lib::init_tracing();

    if let Err(error) = run().await {
        eprintln!("fan-out probe failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let mut providers: Vec<ProviderId> = Vec::new();
    let mut prompt = DEFAULT_PROMPT.to_string();
    let mut system: Option<String> = None;
    let mut reasoning = ReasoningEffort::Off;
    let mut max_tokens: Option<u32> = None;
    let mut show_events = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(());
        }

        if let Some(value) = arg.strip_prefix("--providers=") {
            providers = parse_provider_list(value)?;
            continue;
        }
        if arg == "--providers" {
            let value = args
                .next()
                .ok_or_else(|| "--providers requires a value".to_string())?;
            providers = parse_provider_list(&value)?;
            continue;
        }

        if let Some(value) = arg.strip_prefix("--prompt=") {
            prompt = value.to_string();
            continue;
        }
        if arg == "--prompt" {
            prompt = args
                .next()
                .ok_or_else(|| "--prompt requires a value".to_string())?;
            continue;
        }

        if let Some(value) = arg.strip_prefix("--system=") {
            system = Some(value.to_string());
            continue;
        }
        if arg == "--system" {
            system = Some(
                args.next()
                    .ok_or_else(|| "--system requires a value".to_string())?,
            );
            continue;
        }

        if let Some(value) = arg.strip_prefix("--reasoning=") {
            reasoning = ReasoningEffort::from_str(value)?;
            continue;
        }
        if arg == "--reasoning" {
            let value = args
                .next()
                .ok_or_else(|| "--reasoning requires a value".to_string())?;
            reasoning = ReasoningEffort::from_str(&value)?;
            continue;
        }

        if let Some(value) = arg.strip_prefix("--max-tokens=") {
            max_tokens = Some(parse_positive_u32(value, "--max-tokens")?);
            continue;
        }
        if arg == "--max-tokens" {
            let value = args
                .next()
                .ok_or_else(|| "--max-tokens requires a value".to_string())?;
            max_tokens = Some(parse_positive_u32(&value, "--max-tokens")?);
            continue;
        }

        if arg == "--events" {
            show_events = true;
            continue;
        }

        return Err(format!("unknown argument: {arg}"));
    }

    let services = resolve_services(&providers)?;
    if services.len() > MAX_FANOUT_MEMBERS {
        println!(
            "{} services configured; only the first {MAX_FANOUT_MEMBERS} will run",
            services.len()
        );
    }

    let mut config = EngineConfig::default();
    config.apply_env_overrides();
    let engine = RequestEngine::with_reqwest(config).map_err(|error| error.to_string())?;
    let bus = Arc::new(EventBus::new());
    let orchestrator = FanOutOrchestrator::new(engine).with_bus(bus.clone());

    if show_events {
        let mut events = bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if !is_lifecycle_event(&event) {
                    continue;
                }
                match &event.member {
                    Some(member) => eprintln!(
                        "[{}] {} {} {}",
                        event.seq, member.service_name, event.event_type, event.payload
                    ),
                    None => eprintln!("[{}] {} {}", event.seq, event.event_type, event.payload),
                }
            }
        });
    }

    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));

    let settings = GenerationSettings {
        max_tokens,
        ..GenerationSettings::default()
    }
    .with_reasoning(reasoning);

    let session = orchestrator.start(FanOutRequest::new(services, messages).with_settings(settings));
    let mut updates = session.subscribe();

    let mp = MultiProgress::new();
    let bars: Vec<ProgressBar> = session
        .members()
        .iter()
        .map(|member| {
            let pb = mp.add(ProgressBar::new_spinner());
            pb.set_style(
                ProgressStyle::with_template("{spinner} {prefix:.bold.dim} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_prefix(format!("{}/{}", member.service_name, member.model));
            pb.set_message("pending");
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        })
        .collect();

    loop {
        let snapshot = updates.borrow_and_update().clone();
        for (pb, member) in bars.iter().zip(&snapshot.members) {
            pb.set_message(progress_message(member));
        }
        if snapshot.state != SessionState::Dispatching {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                session.cancel();
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    session.wait().await;

    for (pb, member) in bars.iter().zip(session.members()) {
        pb.finish_with_message(progress_message(&member));
    }

    println!();
    for member in session.members() {
        println!(
            "== {} ({}/{}) [{}]",
            member.service_name,
            member.service_type,
            member.model,
            member.status.as_str()
        );
        if let Some(error) = &member.error {
            println!("error: {error}");
        }
        if !member.text.is_empty() {
            println!("{}", member.text.trim());
        }
        println!();
    }

    Ok(())
}

fn progress_message(member: &AgentRun) -> String {
    match member.status {
        AgentStatus::Pending => "pending".to_string(),
        AgentStatus::Streaming => format!("streaming ({} chars)", member.text.chars().count()),
        AgentStatus::Complete => format!("complete ({} chars)", member.text.chars().count()),
        AgentStatus::Failed => format!("failed: {}", member.error.as_deref().unwrap_or("unknown")),
        AgentStatus::Cancelled => "cancelled".to_string(),
    }
}

/// Explicit providers must all be configured; with none given, every provider
/// with environment configuration is used.
fn resolve_services(providers: &[ProviderId]) -> Result<Vec<ServiceConfig>, String> {
    if providers.is_empty() {
        let services: Vec<ServiceConfig> = ProviderId::all()
            .iter()
            .filter_map(|provider| ServiceConfig::from_env(provider.as_str()))
            .filter(|service| usable(service))
            .collect();
        if services.is_empty() {
            return Err(
                "no provider configured; set e.g. OPENAI_API_KEY or pass --providers".to_string(),
            );
        }
        return Ok(services);
    }

    providers
        .iter()
        .map(|provider| {
            ServiceConfig::from_env(provider.as_str())
                .filter(usable)
                .or_else(|| {
                    (!provider.requires_api_key())
                        .then(|| ServiceConfig::new(provider.as_str(), provider.as_str(), ""))
                })
                .ok_or_else(|| {
                    let prefix = provider.as_str().to_ascii_uppercase().replace('-', "_");
                    format!("{provider} is not configured; set {prefix}_API_KEY")
                })
        })
        .collect()
}

/// Key-based providers need a key even when only their model is set in the environment.
fn usable(service: &ServiceConfig) -> bool {
    service.has_api_key()
        || ProviderId::from_str(&service.provider).is_ok_and(|provider| !provider.requires_api_key())
}

fn parse_provider_list(value: &str) -> Result<Vec<ProviderId>, String> {
    let providers = value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ProviderId::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if providers.is_empty() {
        return Err("--providers requires at least one provider".to_string());
    }
    Ok(providers)
}

fn parse_positive_u32(value: &str, flag: &str) -> Result<u32, String> {
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(format!("{flag} expects a positive integer, got '{value}'")),
    }
}

fn print_help() {
    println!("Fan one prompt out to up to {MAX_FANOUT_MEMBERS} providers and stream the answers");
    println!();
    println!("Usage:");
    println!("  cargo run --bin fanout_probe -- [options]");
    println!();
    println!("Options:");
    println!("  --providers a,b,c        Providers to query (default: every configured provider)");
    println!("  --prompt <text>          User prompt");
    println!("  --system <text>          Optional system prompt");
    println!("  --reasoning off|low|medium|high  Reasoning effort (default: off)");
    println!("  --max-tokens <n>         Output token cap");
    println!("  --events                 Print lifecycle events from the progress bus");
    println!();
    println!("Providers read {{PROVIDER}}_API_KEY, {{PROVIDER}}_MODEL and {{PROVIDER}}_BASE_URL");
    println!("from the environment or a .env file.");
}
