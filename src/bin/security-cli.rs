use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use zeroize::Zeroizing;

use compliance_security::config::secrets::generate_key;

#[derive(Parser)]
#[command(name = "security-cli")]
#[command(about = "Operator CLI for the compliance security service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8443")]
    url: String,

    /// Admin API key; defaults to CSEC_ADMIN_API_KEY.
    #[arg(short, long, env = "CSEC_ADMIN_API_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service status and key versions
    Status,
    /// Replay a tenant's audit chain and report the first broken link
    VerifyChain { tenant: String },
    /// Export a tenant's audit records
    Records { tenant: String },
    /// Print a fresh base64 256-bit key for the secret environment
    GenKey,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let path = match &cli.command {
        Commands::GenKey => {
            let key = Zeroizing::new(generate_key());
            println!("{}", BASE64.encode(*key));
            return Ok(());
        }
        Commands::Status => "/admin/status".to_string(),
        Commands::VerifyChain { tenant } => format!("/admin/audit/{}/verify", tenant),
        Commands::Records { tenant } => format!("/admin/audit/{}/records", tenant),
    };

    let key = cli.key.ok_or("admin API key required (--key or CSEC_ADMIN_API_KEY)")?;
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    let res = reqwest::Client::new()
        .get(format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    let json = print_response(res).await?;

    // Exit status 2 signals a broken chain.
    if matches!(cli.command, Commands::VerifyChain { .. }) && !json["first_broken"].is_null() {
        std::process::exit(2);
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<Value, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(json)
}
