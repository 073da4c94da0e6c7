//! Mock market stream server.
//!
//! Records the request target of every handshake and pushes frames to the
//! connections whose target contains a given fragment.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Command {
    Push { fragment: String, text: String },
    DropAll,
}

pub struct MockWsServer {
    addr: SocketAddr,
    paths: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    commands: broadcast::Sender<Command>,
    shutdown: CancellationToken,
}

impl MockWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (commands, _) = broadcast::channel(256);
        let server = Self {
            addr,
            paths: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(0)),
            commands,
            shutdown: CancellationToken::new(),
        };

        let conn = ConnectionShared {
            paths: server.paths.clone(),
            active: server.active.clone(),
            total: server.total.clone(),
            commands: server.commands.clone(),
            shutdown: server.shutdown.clone(),
        };
        let shutdown = server.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        if let Ok((stream, _)) = accepted {
                            tokio::spawn(handle_connection(stream, conn.clone()));
                        }
                    }
                    () = shutdown.cancelled() => break,
                }
            }
        });

        server
    }

    /// Base URL without path, as passed to `WsTransport`.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send `text` to every connection whose request target contains `fragment`.
    pub fn push(&self, fragment: &str, text: String) {
        let _ = self.commands.send(Command::Push {
            fragment: fragment.to_string(),
            text,
        });
    }

    /// Drop every connection without a close handshake.
    pub fn drop_all(&self) {
        let _ = self.commands.send(Command::DropAll);
    }

    /// Request targets in handshake order.
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Clone)]
struct ConnectionShared {
    paths: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    commands: broadcast::Sender<Command>,
    shutdown: CancellationToken,
}

async fn handle_connection(stream: TcpStream, shared: ConnectionShared) {
    let mut commands = shared.commands.subscribe();
    let target = Arc::new(Mutex::new(String::new()));

    let record = target.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        *record.lock() = request.uri().to_string();
        Ok(response)
    };
    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {e}");
            return;
        }
    };

    let target = target.lock().clone();
    shared.paths.lock().push(target.clone());
    shared.active.fetch_add(1, Ordering::SeqCst);
    shared.total.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws_stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(Command::Push { fragment, text }) => {
                    if target.contains(&fragment) && write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Command::DropAll) | Err(_) => break,
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            () = shared.shutdown.cancelled() => break,
        }
    }

    shared.active.fetch_sub(1, Ordering::SeqCst);
}
