//! switchboard: route and dispatch prompts from the command line
//!
//! Builds a gateway from the config file, then previews a routing
//! decision, runs a generation, or lists providers.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use futures_util::StreamExt;
use switchboard::types::{GenerateEvent, GenerateOptions};
use switchboard::{Config, RouteRequest, RoutingPolicy, Secrets, Switchboard, TaskCategory};

/// Switchboard CLI
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version)]
#[command(about = "Task-aware LLM routing with fallback")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the ranked candidates for a prompt without calling anything
    Route {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        #[command(flatten)]
        routing: RoutingArgs,
        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Route a prompt and print the response
    Generate {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        #[command(flatten)]
        routing: RoutingArgs,
        /// Stream the response as it arrives
        #[arg(long)]
        stream: bool,
        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,
    },

    /// List providers with their tracked performance
    Providers,
}

#[derive(ClapArgs)]
struct RoutingArgs {
    /// Task category (planning, execution, reflection, vision,
    /// conversation, reasoning, coding, general)
    #[arg(short, long, default_value = "general")]
    task: TaskCategory,
    /// Routing policy (balanced, cost, speed, quality, offline, privacy)
    #[arg(short, long)]
    policy: Option<RoutingPolicy>,
    /// Maximum estimated cost in USD
    #[arg(long)]
    max_cost: Option<f64>,
    /// Maximum tracked latency in milliseconds
    #[arg(long)]
    max_latency_ms: Option<u64>,
    /// Never route to this provider (repeatable)
    #[arg(long)]
    deny: Vec<String>,
    /// Disable fallback for this request
    #[arg(long)]
    no_fallback: bool,
}

impl RoutingArgs {
    fn apply(self, mut request: RouteRequest) -> RouteRequest {
        request = request.task(self.task);
        if let Some(policy) = self.policy {
            request = request.policy(policy);
        }
        if let Some(cost) = self.max_cost {
            request = request.max_cost(cost);
        }
        if let Some(ms) = self.max_latency_ms {
            request = request.max_latency_ms(ms);
        }
        for provider in self.deny {
            request = request.deny(provider);
        }
        if self.no_fallback {
            request = request.fallback(false);
        }
        request
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("switchboard=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let board = config.into_builder(&secrets)?.build()?;

    match args.command {
        Command::Route {
            prompt,
            routing,
            json,
        } => {
            let prompt = resolve_text(prompt, "route")?;
            let request = routing.apply(RouteRequest::prompt(prompt));
            let decision = board.route(&request)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                println!(
                    "task: {}  policy: {}  ~{} tokens",
                    decision.task, decision.policy, decision.estimated_tokens
                );
                for (rank, c) in decision.candidates.iter().enumerate() {
                    println!(
                        "{:>2}. {:<16} {:>7.2}  ${:.5}  {}",
                        rank + 1,
                        c.provider,
                        c.score,
                        c.estimated_cost,
                        c.reasoning
                    );
                }
                for r in &decision.relaxations {
                    println!("relaxed: {r:?}");
                }
                for e in &decision.exclusions {
                    println!("excluded: {e}");
                }
            }
        }

        Command::Generate {
            prompt,
            routing,
            stream,
            max_tokens,
            temperature,
        } => {
            let prompt = resolve_text(prompt, "generate")?;
            let mut options = GenerateOptions::new();
            if let Some(max) = max_tokens {
                options = options.max_tokens(max);
            }
            if let Some(t) = temperature {
                options = options.temperature(t);
            }
            let request = routing.apply(RouteRequest::prompt(prompt).options(options));

            if stream {
                generate_streaming(&board, &request).await?;
            } else {
                let routed = board.generate(&request).await?;
                println!("{}", routed.content());
                let p = &routed.provenance;
                eprintln!(
                    "[{} / {}, {}ms, ~${:.5}, path: {}]",
                    p.provider,
                    p.model,
                    p.latency_ms,
                    p.estimated_cost,
                    p.fallback_path.join(" -> ")
                );
            }
        }

        Command::Providers => {
            for s in board.performance_stats() {
                let state = match (s.enabled, s.performance.quarantined) {
                    (false, _) => "disabled",
                    (true, true) => "quarantined",
                    (true, false) => "ok",
                };
                println!(
                    "{:<16} {:<32} prio {:>3}  {:<11} {:?}/{:?}  avg {:.0}ms ({} samples)  fails {}",
                    s.provider,
                    s.model,
                    s.priority,
                    state,
                    s.cost_class,
                    s.latency_class,
                    s.performance.avg_latency_ms,
                    s.performance.sample_count,
                    s.performance.consecutive_failures,
                );
            }
        }
    }

    Ok(())
}

async fn generate_streaming(
    board: &Switchboard,
    request: &RouteRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = board.generate_stream(request).await?;
    let provider = stream.provenance.provider.clone();
    let mut stdout = io::stdout();
    while let Some(event) = stream.next().await {
        match event? {
            GenerateEvent::Text(text) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            GenerateEvent::ToolCall(call) => {
                println!("\n[tool call] {}({})", call.name, call.arguments);
            }
            GenerateEvent::Usage(usage) => {
                eprintln!(
                    "\n[{} tokens in, {} out]",
                    usage.prompt_tokens, usage.completion_tokens
                );
            }
            GenerateEvent::Done => break,
            _ => {}
        }
    }
    println!();
    eprintln!("[via {provider}]");
    Ok(())
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
