// src/main.rs

use std::io::Write as _;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use docuchat::config::CONFIG;
use docuchat::documents::DocumentsClient;
use docuchat::manager::{ChatClient, ChatSnapshot, ClientOptions};
use docuchat::session::Role;
use docuchat::ConnectionStatus;

#[derive(Parser, Debug)]
#[command(name = "docuchat", about = "Terminal chat against a document-chat backend")]
struct Args {
    /// Backend base URL (e.g. http://localhost:8000)
    #[arg(long, env = "DOCUCHAT_BACKEND_URL")]
    backend: Option<String>,

    /// Log level (error|warn|info|debug|trace)
    #[arg(long, env = "DOCUCHAT_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level: Level = args
        .log_level
        .as_deref()
        .unwrap_or(&CONFIG.log_level)
        .parse()
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut options = ClientOptions::from(&*CONFIG);
    if let Some(backend) = args.backend {
        options.backend_url = backend;
    }
    let backend_url = options.backend_url.clone();
    let request_timeout = options.request_timeout;

    info!("Connecting to {}", backend_url);
    let client = ChatClient::start(options)?;
    let documents = DocumentsClient::new(&backend_url, request_timeout)?;

    let mut snapshots = client.subscribe();
    wait_for_ready(&mut snapshots).await;
    println!("docuchat ready ({}). /docs /upload <files> /clear /quit", client.snapshot().status);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break, // stdin closed
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        let line = line.trim().to_string();

        match line.as_str() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                client.clear().await;
                println!("(session cleared)");
            }
            "/docs" => match documents.list_documents().await {
                Ok(list) => {
                    for doc in &list.documents {
                        println!("  {}", doc.name);
                    }
                    println!("({} documents)", list.count);
                }
                Err(e) => println!("document list failed: {e}"),
            },
            _ if line.starts_with("/upload") => {
                let mut vlm = false;
                let paths: Vec<String> = line
                    .split_whitespace()
                    .skip(1)
                    .filter(|arg| {
                        if *arg == "--vlm" {
                            vlm = true;
                            false
                        } else {
                            true
                        }
                    })
                    .map(str::to_string)
                    .collect();
                if paths.is_empty() {
                    println!("usage: /upload <files..> [--vlm]");
                    continue;
                }
                match documents.upload_documents(&paths, vlm).await {
                    Ok(result) => println!("{}", result.message),
                    Err(e) => println!("upload failed: {e}"),
                }
            }
            _ => {
                if !client.snapshot().can_send() {
                    println!("(not ready: {})", client.snapshot().status);
                    continue;
                }
                client.send(line).await;
                stream_reply(&mut snapshots).await?;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Block until the manager settles on a usable transport (connected, or
/// permanently in fallback mode).
async fn wait_for_ready(snapshots: &mut watch::Receiver<ChatSnapshot>) {
    loop {
        {
            let snapshot = snapshots.borrow_and_update();
            if matches!(
                snapshot.status,
                ConnectionStatus::Connected | ConnectionStatus::Fallback
            ) {
                return;
            }
        }
        if snapshots.changed().await.is_err() {
            return;
        }
    }
}

/// Print assistant output as it streams, returning once the reply settles.
async fn stream_reply(snapshots: &mut watch::Receiver<ChatSnapshot>) -> Result<()> {
    let mut current_id: Option<String> = None;
    let mut printed = 0usize;

    loop {
        if snapshots.changed().await.is_err() {
            break;
        }
        let snapshot = snapshots.borrow_and_update().clone();

        if let Some(last) = snapshot.messages.last() {
            if last.role == Role::Assistant {
                if current_id.as_deref() != Some(last.id.as_str()) {
                    if current_id.is_some() {
                        println!();
                    }
                    current_id = Some(last.id.clone());
                    printed = 0;
                }
                if last.content.len() > printed {
                    print!("{}", &last.content[printed..]);
                    std::io::stdout().flush()?;
                    printed = last.content.len();
                }
            }
        }

        if !snapshot.reply_pending {
            break;
        }
    }

    println!();
    Ok(())
}
