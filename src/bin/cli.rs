// Exam session coordinator CLI
// Validates a running coordinator (health, meeting lifecycle, signaling
// smoke flows) and runs the local anti-cheat scanner used by the desktop
// shell on candidate machines.

use clap::{Parser, Subcommand};
use colored::*;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use exam_session_server::anticheat;

#[derive(Parser)]
#[command(name = "exam-session-cli")]
#[command(about = "Exam session coordinator validation and proctoring tool", long_about = None)]
struct Cli {
    /// Coordinator address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the coordinator health endpoint
    Health,

    /// Create a meeting and print its code
    CreateMeeting {
        /// Host username recorded on the room
        #[arg(long, default_value = "host")]
        host: String,

        /// Meeting duration in minutes
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Validate a meeting code
    Validate {
        code: String,
    },

    /// End a meeting as its host
    EndMeeting {
        code: String,

        #[arg(short, long)]
        username: String,
    },

    /// Join a meeting over the signaling socket and print room events
    Join {
        /// Meeting code
        #[arg(short, long)]
        room: String,

        #[arg(short, long)]
        username: String,

        #[arg(long, default_value = "candidate")]
        role: String,

        /// Optional chat message to send after joining
        #[arg(short, long)]
        message: Option<String>,

        /// How long to listen for room events before leaving
        #[arg(short, long, default_value_t = 10)]
        listen_secs: u64,
    },

    /// Scan local processes against the denylist once; prints a summary
    /// line to stderr and the JSON result as the final stdout line
    Scan {
        /// Also match denylist entries by substring containment
        #[arg(short, long)]
        fuzzy: bool,
    },

    /// Scan repeatedly at a fixed interval until a violation trips
    Watch {
        #[arg(short, long)]
        fuzzy: bool,

        /// Seconds between scans
        #[arg(short, long, default_value_t = 10)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => check_health(&cli.server).await,
        Commands::CreateMeeting { host, duration } => {
            create_meeting(&cli.server, host, *duration).await
        }
        Commands::Validate { code } => validate_meeting(&cli.server, code).await,
        Commands::EndMeeting { code, username } => end_meeting(&cli.server, code, username).await,
        Commands::Join {
            room,
            username,
            role,
            message,
            listen_secs,
        } => join_meeting(&cli.server, room, username, role, message.as_deref(), *listen_secs).await,
        Commands::Scan { fuzzy } => run_scan(*fuzzy),
        Commands::Watch { fuzzy, interval } => watch(*fuzzy, *interval).await,
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking coordinator health...".cyan());

    let url = format!("http://{}/health", server);
    match reqwest::Client::new().get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            println!("{} Health check passed", "✓".green());
            if let Ok(body) = resp.json::<serde_json::Value>().await {
                println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
            }
        }
        Ok(resp) => println!("{} Health check failed: {}", "✗".red(), resp.status()),
        Err(e) => {
            println!("{} Cannot connect to coordinator: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn create_meeting(server: &str, host: &str, duration: Option<u64>) {
    println!("{}", "Creating meeting...".cyan());

    let url = format!("http://{}/meetings", server);
    let mut body = json!({ "host": host });
    if let Some(minutes) = duration {
        body["duration"] = json!(minutes);
    }

    match reqwest::Client::new().post(&url).json(&body).send().await {
        Ok(resp) if resp.status().is_success() => {
            let meeting: serde_json::Value = resp.json().await.unwrap_or_default();
            println!("{} Meeting created", "✓".green());
            println!("  Code: {}", meeting["code"].as_str().unwrap_or("?").bold());
            println!("  Host: {}", meeting["host"].as_str().unwrap_or("?"));
            println!("  Expires at (ms): {}", meeting["expiresAt"]);
        }
        Ok(resp) => println!("{} Create failed: {}", "✗".red(), resp.status()),
        Err(e) => println!("{} Cannot connect to coordinator: {}", "✗".red(), e),
    }
}

async fn validate_meeting(server: &str, code: &str) {
    let url = format!("http://{}/meetings/validate", server);
    match reqwest::Client::new()
        .post(&url)
        .json(&json!({ "code": code }))
        .send()
        .await
    {
        Ok(resp) => {
            let status = resp.status();
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            if body["valid"] == true {
                println!("{} Code {} is valid and active", "✓".green(), code.bold());
            } else {
                println!(
                    "{} Code {} rejected ({}): {}",
                    "✗".red(),
                    code,
                    status,
                    body["error"].as_str().unwrap_or("unknown")
                );
            }
        }
        Err(e) => println!("{} Cannot connect to coordinator: {}", "✗".red(), e),
    }
}

async fn end_meeting(server: &str, code: &str, username: &str) {
    let url = format!("http://{}/meetings/{}/end", server, code);
    match reqwest::Client::new()
        .post(&url)
        .json(&json!({ "username": username }))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            println!("{} Meeting {} ended", "✓".green(), code.bold());
        }
        Ok(resp) => {
            println!("{} End failed: {}", "✗".red(), resp.status());
        }
        Err(e) => println!("{} Cannot connect to coordinator: {}", "✗".red(), e),
    }
}

async fn join_meeting(
    server: &str,
    room: &str,
    username: &str,
    role: &str,
    message: Option<&str>,
    listen_secs: u64,
) {
    println!("{}", format!("Joining meeting {}...", room).cyan());

    let url = format!("ws://{}/ws", server);
    let (ws_stream, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            println!("{} WebSocket connection failed: {}", "✗".red(), e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let join = json!({
        "type": "join",
        "room": room,
        "username": username,
        "role": role,
    });
    if write.send(Message::Text(join.to_string())).await.is_err() {
        println!("{} Failed to send join", "✗".red());
        return;
    }

    let participants = json!({ "type": "participants-request", "room": room });
    let _ = write.send(Message::Text(participants.to_string())).await;

    if let Some(text) = message {
        let chat = json!({
            "type": "chat-message",
            "room": room,
            "username": username,
            "message": text,
        });
        let _ = write.send(Message::Text(chat.to_string())).await;
    }

    println!(
        "{} Joined, listening for {}s (Ctrl+C to quit early)",
        "✓".green(),
        listen_secs
    );

    let listen = async {
        while let Some(Ok(frame)) = read.next().await {
            if let Message::Text(text) = frame {
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(event) => print_room_event(&event),
                    Err(_) => println!("  {} {}", "?".yellow(), text),
                }
            }
        }
    };
    let _ = timeout(Duration::from_secs(listen_secs), listen).await;

    let leave = json!({ "type": "leave", "room": room, "username": username });
    let _ = write.send(Message::Text(leave.to_string())).await;
    println!("{} Left meeting", "✓".green());
}

fn print_room_event(event: &serde_json::Value) {
    match event["type"].as_str().unwrap_or("") {
        "peer-joined" => println!("  {} {} joined", "→".green(), event["username"]),
        "peer-left" => println!("  {} {} left", "←".yellow(), event["username"]),
        "chat-message" => println!(
            "  {} {}: {}",
            "#".blue(),
            event["username"],
            event["message"]
        ),
        "participants" => println!("  {} participants: {}", "*".cyan(), event["list"]),
        "meeting-ended" => println!("  {} meeting ended", "✗".red()),
        "meeting-error" => println!("  {} error: {}", "✗".red(), event["error"]),
        other => println!("  {} {}: {}", "?".yellow(), other, event),
    }
}

/// One scan: human-readable summary on stderr first, then the JSON result
/// as the final stdout line (the desktop shell parses the last JSON line).
fn run_scan(fuzzy: bool) {
    let started = std::time::Instant::now();
    let result = anticheat::scan(fuzzy);
    let elapsed_ms = started.elapsed().as_millis();

    eprintln!(
        "[AntiCheat] scanned={} banned={} critical={} high={} threat={:?} fuzzy={} elapsed_ms={}",
        result.process_count,
        result.count,
        result.critical_violations.len(),
        result.high_severity_violations.len(),
        result.threat_level,
        result.fuzzy_mode,
        elapsed_ms
    );
    println!("{}", serde_json::to_string(&result).unwrap_or_default());
}

async fn watch(fuzzy: bool, interval: u64) {
    println!(
        "{}",
        format!("Watching processes every {}s...", interval).cyan()
    );

    loop {
        let result = anticheat::scan(fuzzy);
        if result.should_terminate {
            println!(
                "{} Violation detected: {} (threat level {:?})",
                "✗".red().bold(),
                result.banned.join(", "),
                result.threat_level
            );
            println!("{}", serde_json::to_string(&result).unwrap_or_default());
            std::process::exit(1);
        }

        println!(
            "{} Clean scan, {} processes checked",
            "✓".green(),
            result.process_count
        );
        sleep(Duration::from_secs(interval)).await;
    }
}
