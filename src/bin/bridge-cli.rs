use std::collections::HashMap;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Send messages through a running broker-bridge", long_about = None)]
struct Cli {
    /// Bridge base URL, including the home route
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Basic auth credentials as login:passcode
    #[arg(long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and wait for the broker receipt
    Send {
        /// Broker destination, e.g. queue/orders
        destination: String,
        /// Message body
        message: String,
        /// Extra message header (repeatable)
        #[arg(short = 'H', long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", raw))
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Send {
            destination,
            message,
            headers,
        } => {
            let headers: HashMap<String, String> = headers.into_iter().collect();
            let url = format!(
                "{}/{}",
                cli.url.trim_end_matches('/'),
                destination.trim_start_matches('/')
            );

            let mut request = client
                .post(url)
                .json(&json!({ "message": message, "headers": headers }));
            if let Some(user) = &cli.user {
                let (login, passcode) = user.split_once(':').unwrap_or((user.as_str(), ""));
                request = request.basic_auth(login, Some(passcode));
            }

            let res = request.send().await?;
            print_response(res).await
        }
    }
}

async fn print_response(res: reqwest::Response) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: bridge returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(ExitCode::FAILURE);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    if json.get("exception").is_some() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
