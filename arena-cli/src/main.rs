//! Arena CLI Tool
//!
//! Command line interface for managing a running Arena Gateway

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arena-cli")]
#[command(about = "A CLI tool for managing Arena Gateway")]
struct Cli {
    /// Gateway base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    gateway: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Register a backend worker with the gateway
    Register {
        /// Worker display name
        #[arg(short, long)]
        name: String,
        /// Worker HTTP API endpoint URL
        #[arg(short, long)]
        endpoint: String,
        /// Capabilities the worker serves
        #[arg(short, long, default_values_t = vec!["chat".to_string()])]
        capabilities: Vec<String>,
        /// Per-minute request limit
        #[arg(long)]
        rate_limit: Option<u32>,
        /// Per-day request limit
        #[arg(long)]
        daily_limit: Option<u32>,
    },
    /// List registered workers
    List,
    /// Probe all workers and show results
    Health,
    /// Show fleet routing statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match arena_core::load_config_from_path(&config) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!("  - bind address: {}", cfg.server.bind_address);
                    println!("  - strategy: {}", cfg.fleet.strategy.as_str());
                    println!(
                        "  - storage: {}",
                        if cfg.fleet.storage_path.is_empty() {
                            "in-memory"
                        } else {
                            &cfg.fleet.storage_path
                        }
                    );
                    println!(
                        "  - bridge passthrough: {}",
                        if cfg.bridge_enabled() {
                            cfg.forward.fallback_bridge.as_str()
                        } else {
                            "disabled"
                        }
                    );
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Register {
            name,
            endpoint,
            capabilities,
            rate_limit,
            daily_limit,
        } => {
            println!("Registering worker '{}' at {}", name, endpoint);
            let body = serde_json::json!({
                "name": name,
                "endpoint": endpoint,
                "capabilities": capabilities,
                "rate_limit": rate_limit,
                "daily_limit": daily_limit,
            });
            let response = client
                .post(format!("{}/clients/register", cli.gateway))
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            let data: serde_json::Value = response.json().await?;
            if status.is_success() {
                println!("✅ Worker registered");
                println!("  - id:     {}", data["id"].as_str().unwrap_or("?"));
                println!("  - secret: {}", data["secret"].as_str().unwrap_or("?"));
                println!("Store the secret now; it is never shown again.");
            } else {
                eprintln!("❌ Registration failed ({}): {}", status, data["error"]["message"]);
                std::process::exit(1);
            }
        }
        Commands::List => {
            let data: serde_json::Value = client
                .get(format!("{}/clients", cli.gateway))
                .send()
                .await?
                .json()
                .await?;
            let clients = data["clients"].as_array().cloned().unwrap_or_default();
            println!("{} workers registered", clients.len());
            for c in clients {
                println!(
                    "  {} [{}] {} ({}; {} requests, health {})",
                    c["id"].as_str().unwrap_or("?"),
                    c["status"].as_str().unwrap_or("?"),
                    c["name"].as_str().unwrap_or("?"),
                    c["endpoint"].as_str().unwrap_or("?"),
                    c["stats"]["totalRequests"],
                    c["stats"]["healthStatus"].as_str().unwrap_or("?"),
                );
            }
        }
        Commands::Health => {
            println!("Probing all workers...");
            let data: serde_json::Value = client
                .post(format!("{}/health/check", cli.gateway))
                .send()
                .await?
                .json()
                .await?;
            let results = data["results"].as_object().cloned().unwrap_or_default();
            if results.is_empty() {
                println!("No workers registered");
            }
            for (id, result) in results {
                if result["healthy"].as_bool().unwrap_or(false) {
                    println!(
                        "✅ {} healthy ({:.1}ms)",
                        id,
                        result["response_time_ms"].as_f64().unwrap_or(0.0)
                    );
                } else {
                    println!(
                        "❌ {} unhealthy: {}",
                        id,
                        result["error"].as_str().unwrap_or("unknown error")
                    );
                }
            }
        }
        Commands::Stats => {
            let stats: serde_json::Value = client
                .get(format!("{}/stats", cli.gateway))
                .send()
                .await?
                .json()
                .await?;
            println!("Fleet routing statistics:");
            println!("  - workers:    {} total, {} active", stats["totalWorkers"], stats["activeWorkers"]);
            println!(
                "  - requests:   {} total, {} ok, {} failed",
                stats["totalRequests"], stats["successfulRequests"], stats["failedRequests"]
            );
            println!(
                "  - success:    {:.1}%",
                stats["successRate"].as_f64().unwrap_or(0.0) * 100.0
            );
            println!("  - strategy:   {}", stats["strategy"].as_str().unwrap_or("?"));
        }
    }

    Ok(())
}
