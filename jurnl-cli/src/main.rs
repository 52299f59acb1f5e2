//! jurnl-cli: operator client for a running Jurnl server
//!
//! # Subcommands
//! - `status`                          server health
//! - `streams list|create|show|delete|stats` stream actions for one user session
//! - `process-streams`                 trigger one batch pass (needs the cron secret)

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

#[derive(Debug, Parser)]
#[command(name = "jurnl-cli", version, about = "Jurnl research assistant operator CLI")]
struct Cli {
    /// Jurnl HTTP server URL
    #[arg(long, env = "JURNL_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server health
    Status,

    /// Manage the streams of one user
    Streams {
        /// Session access token of the user
        #[arg(long, env = "JURNL_ACCESS_TOKEN")]
        token: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,

        #[command(subcommand)]
        action: StreamsCommand,
    },

    /// Run one batch pass over stale streams
    ProcessStreams {
        #[arg(long, env = "CRON_SECRET")]
        secret: String,
    },
}

#[derive(Debug, Subcommand)]
enum StreamsCommand {
    List,
    Create {
        /// Research topic to follow
        topic: String,
    },
    /// Show a stream and its updates
    Show { id: i64 },
    Delete { id: i64 },
    Stats,
}

#[derive(Debug, Deserialize)]
pub struct StreamSummary {
    pub id: i64,
    pub topic: String,
    pub frequency: String,
    pub last_updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSummary {
    pub content: String,
    pub generated_at: String,
}

/// Request envelope for `POST /api/mcp/streams`.
fn action_body(action: &StreamsCommand) -> Value {
    match action {
        StreamsCommand::List => json!({ "action": "get_all_user_streams" }),
        StreamsCommand::Create { topic } => json!({ "action": "create_stream", "topic": topic }),
        StreamsCommand::Show { id } => json!({ "action": "get_stream_with_updates", "stream_id": id }),
        StreamsCommand::Delete { id } => json!({ "action": "delete_stream", "stream_id": id }),
        StreamsCommand::Stats => json!({ "action": "get_dashboard_stats" }),
    }
}

pub fn format_stream(s: &StreamSummary) -> String {
    format!("#{:<6} {:<10} {}  (updated {})", s.id, s.frequency, s.topic, s.last_updated_at)
}

fn print_streams(value: &Value) -> anyhow::Result<()> {
    let streams: Vec<StreamSummary> = serde_json::from_value(value.clone())?;
    if streams.is_empty() {
        println!("No streams.");
    }
    for s in &streams {
        println!("{}", format_stream(s));
    }
    Ok(())
}

fn print_result(action: &StreamsCommand, body: &Value) -> anyhow::Result<()> {
    match action {
        StreamsCommand::List => print_streams(&body["streams"])?,
        StreamsCommand::Create { .. } => {
            let stream: StreamSummary = serde_json::from_value(body["stream"].clone())?;
            println!("Created {}", format_stream(&stream));
        }
        StreamsCommand::Show { .. } => {
            let stream: StreamSummary = serde_json::from_value(body["stream"].clone())?;
            let updates: Vec<UpdateSummary> = serde_json::from_value(body["updates"].clone())?;
            println!("{}\n", format_stream(&stream));
            if updates.is_empty() {
                println!("No updates yet.");
            }
            for u in &updates {
                println!("--- {} ---\n{}\n", u.generated_at, u.content);
            }
        }
        StreamsCommand::Delete { id } => println!("Deleted stream #{}", id),
        StreamsCommand::Stats => {
            let stats = &body["stats"];
            println!("Streams:              {}", stats["total_streams"]);
            println!("Updates (last 7 days): {}", stats["recent_updates"]);
            println!("Recently updated:");
            print_streams(&stats["recent_streams"])?;
        }
    }
    Ok(())
}

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send and decode; non-2xx responses exit with the server's error message.
fn send_json(request: reqwest::blocking::RequestBuilder, url: &str) -> anyhow::Result<Value> {
    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("jurnl-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("unknown error");
        eprintln!("jurnl-cli: server returned {}: {}", status, message);
        std::process::exit(1);
    }
    Ok(body)
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let body = send_json(client(10)?.get(&url), &url)?;
    println!("Jurnl server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
    println!("Store:        {}", body["postgresql"].as_str().unwrap_or("?"));
    Ok(())
}

fn do_streams(server: &str, token: &str, action: &StreamsCommand, raw: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/mcp/streams", server);
    let body = send_json(
        client(30)?.post(&url).bearer_auth(token).json(&action_body(action)),
        &url,
    )?;

    if raw {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    print_result(action, &body)
}

fn do_process_streams(server: &str, secret: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/cron/process-streams", server);
    // A pass sleeps between rows, so allow it plenty of time.
    let body = send_json(client(3600)?.get(&url).bearer_auth(secret), &url)?;

    println!("{}", body["message"].as_str().unwrap_or("done"));
    println!("Processed: {}  Errors: {}", body["processed"], body["errors"]);
    if let Some(details) = body["errorDetails"].as_array() {
        for d in details {
            println!("  stream #{}: {}", d["streamId"], d["error"].as_str().unwrap_or("?"));
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match &cli.command {
        Commands::Status => do_status(&server),
        Commands::Streams { token, json, action } => do_streams(&server, token, action, *json),
        Commands::ProcessStreams { secret } => do_process_streams(&server, secret),
    };

    if let Err(e) = result {
        eprintln!("jurnl-cli: {}", e);
        std::process::exit(1);
    }
}
