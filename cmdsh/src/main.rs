// ABOUTME: provides a user-facing cli for talking to the cmdgated chat endpoint.
// ABOUTME: sends requests, checks health, validates payloads, and approves proposed commands.

use clap::{Parser, Subcommand};
use cmdgate_common::ResponseEnvelope;
use serde_json::Value;
use tokio::io::AsyncReadExt;

use cmdsh::{apply_overrides, approve, validate_verdict};

#[derive(Debug, Parser)]
#[command(name = "cmdsh")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Send {
        #[arg(long, default_value = "http://127.0.0.1:8001")]
        url: String,

        #[arg(long)]
        thread_id: Option<String>,

        #[arg(long)]
        tenant_id: Option<String>,

        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        json: Option<String>,
    },
    Health {
        #[arg(long, default_value = "http://127.0.0.1:8001")]
        url: String,
    },
    Validate {
        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        json: Option<String>,
    },
    /// Read a response envelope and print (or send) the request that approves its proposals.
    Approve {
        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        json: Option<String>,

        /// Indices of proposed commands to approve; all of them when omitted.
        #[arg(long, value_delimiter = ',')]
        only: Option<Vec<usize>>,

        /// Send the approval to this gateway instead of printing it.
        #[arg(long)]
        send_to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Send {
            url,
            thread_id,
            tenant_id,
            file,
            json,
        } => {
            let input = read_input(file.as_deref(), json.as_deref()).await?;
            let verdict = validate_verdict(&input);
            if let Some(err) = verdict.error {
                return Err(anyhow::anyhow!("refusing to send invalid request: {}", err.message));
            }
            let request: Value = serde_json::from_str(&input)?;
            let request = apply_overrides(request, thread_id.as_deref(), tenant_id.as_deref())?;
            let response = send(&url, &request).await?;
            print!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Health { url } => {
            let response = reqwest::get(format!("{}/health", url.trim_end_matches('/')))
                .await?
                .error_for_status()?
                .json::<Value>()
                .await?;
            print!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Validate { file, json } => {
            let input = read_input(file.as_deref(), json.as_deref()).await?;
            let verdict = validate_verdict(&input);
            print!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Command::Approve {
            file,
            json,
            only,
            send_to,
        } => {
            let input = read_input(file.as_deref(), json.as_deref()).await?;
            let response: ResponseEnvelope = serde_json::from_str(&input)?;
            let request = approve(&response, only.as_deref())?;
            match send_to {
                Some(url) => {
                    let reply = send(&url, &request).await?;
                    print!("{}", serde_json::to_string_pretty(&reply)?);
                }
                None => print!("{}", serde_json::to_string_pretty(&request)?),
            }
        }
    }

    Ok(())
}

async fn read_input(file: Option<&str>, json: Option<&str>) -> anyhow::Result<String> {
    if let Some(json) = json {
        return Ok(json.to_string());
    }

    if let Some(file) = file {
        return Ok(tokio::fs::read_to_string(file).await?);
    }

    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    Ok(input)
}

// a 500 from the gateway still carries a json error body worth printing
async fn send(url: &str, request: &Value) -> anyhow::Result<Value> {
    let response = reqwest::Client::new()
        .post(format!("{}/chat", url.trim_end_matches('/')))
        .json(request)
        .send()
        .await?;
    Ok(response.json::<Value>().await?)
}
