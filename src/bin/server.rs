//! Progress query and broadcast server.
//!
//! Uses tokio directly (no web framework). One listener answers plain HTTP
//! requests (`/health`, `/processes`); a second accepts persistent observer
//! connections, which receive the full job snapshot as one JSON line per
//! broadcast tick until they disconnect.

use salescope::broadcast::ProgressBroadcaster;
use salescope::registry::JobRegistry;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "salescope-server")]
#[command(about = "Progress query and broadcast server for sales aggregation jobs")]
#[command(version)]
struct Args {
    /// Address answering /health and /processes
    #[arg(long, env = "SALESCOPE_HTTP_ADDR", default_value = "127.0.0.1:8000")]
    http_addr: String,

    /// Address accepting persistent observer connections
    #[arg(long, env = "SALESCOPE_STREAM_ADDR", default_value = "127.0.0.1:8001")]
    stream_addr: String,

    /// SQLite progress store shared with the workers
    #[arg(long, env = "SALESCOPE_DB", default_value = "processes.sqlite")]
    db: PathBuf,

    /// Seconds between broadcast ticks
    #[arg(long, default_value_t = 1)]
    tick_secs: u64,
}

struct AppState {
    registry: Arc<JobRegistry>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let registry = Arc::new(JobRegistry::open(&args.db)?);
    info!("Progress store at {}", args.db.display());

    let broadcaster = Arc::new(ProgressBroadcaster::new(
        Arc::clone(&registry),
        Duration::from_secs(args.tick_secs),
    ));
    tokio::spawn(Arc::clone(&broadcaster).run());

    let stream_listener = TcpListener::bind(&args.stream_addr).await?;
    info!("Observer listener on {}", args.stream_addr);
    tokio::spawn(accept_observers(stream_listener, broadcaster));

    let state = Arc::new(AppState { registry });
    let listener = TcpListener::bind(&args.http_addr).await?;
    info!("HTTP server listening on {}", args.http_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                error!("Error handling connection from {}: {}", addr, e);
            }
        });
    }
}

/// Hand each accepted connection's write half to the broadcaster. The read
/// half is discarded; observers are passive.
async fn accept_observers(listener: TcpListener, broadcaster: Arc<ProgressBroadcaster>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Observer connection from {}", addr);
                let (_, write_half) = stream.into_split();
                broadcaster.connect(write_half).await;
            }
            Err(e) => warn!("Failed to accept observer: {}", e),
        }
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) -> Result<()> {
    // Read request with timeout
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if let Ok(s) = std::str::from_utf8(&buffer) {
                        if s.contains("\r\n\r\n") {
                            break;
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
    .await;

    match read_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            let response = json_response(
                408,
                &ErrorResponse {
                    error: "Request timeout".to_string(),
                },
            )?;
            stream.write_all(&response).await?;
            return Ok(());
        }
    }

    let request = String::from_utf8_lossy(&buffer);
    let Some(request_line) = request.lines().next() else {
        let response = json_response(
            400,
            &ErrorResponse {
                error: "Empty request".to_string(),
            },
        )?;
        stream.write_all(&response).await?;
        return Ok(());
    };

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        let response = json_response(
            400,
            &ErrorResponse {
                error: "Invalid request line".to_string(),
            },
        )?;
        stream.write_all(&response).await?;
        return Ok(());
    }

    let (method, path) = (parts[0], parts[1]);
    let response = route(method, path, &state)?;
    stream.write_all(&response).await?;
    stream.flush().await?;

    Ok(())
}

fn route(method: &str, path: &str, state: &AppState) -> Result<Vec<u8>> {
    match (method, path) {
        ("GET", "/health") => {
            info!("`/health` API called");
            json_response(
                200,
                &HealthResponse {
                    status: "ok".to_string(),
                },
            )
        }
        ("GET", "/processes") => {
            info!("`/processes` API called");
            match state.registry.read_all() {
                Ok(jobs) => json_response(200, &jobs),
                Err(e) => json_response(
                    500,
                    &ErrorResponse {
                        error: e.to_string(),
                    },
                ),
            }
        }
        _ => json_response(
            404,
            &ErrorResponse {
                error: format!("Not found: {} {}", method, path),
            },
        ),
    }
}

fn json_response<T: Serialize>(status_code: u16, body: &T) -> Result<Vec<u8>> {
    let json_body = serde_json::to_string(body)?;
    let status_text = match status_code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        408 => "Request Timeout",
        500 => "Internal Server Error",
        _ => "Unknown",
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status_code,
        status_text,
        json_body.len(),
        json_body
    );

    Ok(response.into_bytes())
}
