//! LiveReload server.
//!
//! Browsers (usually through the LiveReload extension) open a WebSocket,
//! introduce themselves with a `hello` command and then wait for `reload`
//! commands. One thread accepts and greets connections, another broadcasts
//! reloads to everyone that completed the handshake.

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tungstenite::WebSocket;

use crate::error::WatchError;

pub const PROTOCOL: &str = "http://livereload.com/protocols/official-7";
const SERVER_NAME: &str = "kumitate";
const MAX_CLIENTS: usize = 10;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// Commands of the LiveReload protocol that matter here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    Hello {
        #[serde(default)]
        protocols: Vec<String>,
        #[serde(
            rename = "serverName",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        server_name: Option<String>,
    },
    Reload {
        path: String,
        #[serde(rename = "liveCSS")]
        live_css: bool,
    },
    /// `info`, `url` and anything else a client may send.
    #[serde(other)]
    Other,
}

impl Command {
    fn greeting() -> Self {
        Command::Hello {
            protocols: vec![PROTOCOL.into()],
            server_name: Some(SERVER_NAME.into()),
        }
    }

    pub fn reload(path: impl Into<String>) -> Self {
        Command::Reload {
            path: path.into(),
            live_css: true,
        }
    }
}

/// A running LiveReload server. Dropping it stops nothing; the threads
/// live as long as the process.
pub struct LiveReload {
    port: u16,
    tx: Sender<String>,
    _incoming: JoinHandle<()>,
    _broadcast: JoinHandle<()>,
}

impl LiveReload {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Tells every connected browser that `path` changed.
    pub fn send_reload(&self, path: &str) {
        if self.tx.send(path.to_owned()).is_err() {
            tracing::error!("live reload thread is gone");
        }
    }
}

fn reserve_port(port: u16) -> Result<(TcpListener, u16), WatchError> {
    let listener = match TcpListener::bind(("127.0.0.1", port)) {
        Ok(sock) => sock,
        Err(e) => {
            tracing::warn!("port {port} unavailable ({e}), using an ephemeral port");
            TcpListener::bind("127.0.0.1:0").map_err(WatchError::Bind)?
        }
    };

    let addr = listener.local_addr().map_err(WatchError::Bind)?;
    Ok((listener, addr.port()))
}

/// Binds the configured port (or any free one) and starts serving.
pub fn start(port: u16) -> Result<LiveReload, WatchError> {
    let (tcp, port) = reserve_port(port)?;
    let clients: Clients = Arc::new(Mutex::new(Vec::new()));

    let incoming = new_thread_ws_incoming(tcp, clients.clone());
    let (tx, broadcast) = new_thread_ws_reload(clients);

    tracing::info!("live reload listening on port {port}");

    Ok(LiveReload {
        port,
        tx,
        _incoming: incoming,
        _broadcast: broadcast,
    })
}

fn encode(command: &Command) -> Option<tungstenite::Message> {
    match serde_json::to_string(command) {
        Ok(text) => Some(tungstenite::Message::text(text)),
        Err(e) => {
            tracing::error!("couldn't encode live reload command: {e}");
            None
        }
    }
}

/// Waits for the client's `hello` and answers it.
fn handshake(stream: TcpStream) -> Result<WebSocket<TcpStream>, String> {
    stream
        .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
        .map_err(|e| e.to_string())?;
    let mut socket = tungstenite::accept(stream).map_err(|e| e.to_string())?;

    loop {
        match socket.read().map_err(|e| e.to_string())? {
            tungstenite::Message::Text(text) => {
                if let Ok(Command::Hello { protocols, .. }) = serde_json::from_str(text.as_str()) {
                    if !protocols.iter().any(|p| p == PROTOCOL) {
                        return Err(format!("client does not speak {PROTOCOL}"));
                    }
                    break;
                }
            }
            tungstenite::Message::Close(_) => return Err("closed during handshake".into()),
            _ => {}
        }
    }

    let greeting = encode(&Command::greeting()).ok_or("couldn't encode greeting")?;
    socket.send(greeting).map_err(|e| e.to_string())?;
    socket
        .get_ref()
        .set_read_timeout(None)
        .map_err(|e| e.to_string())?;

    Ok(socket)
}

fn new_thread_ws_incoming(server: TcpListener, clients: Clients) -> JoinHandle<()> {
    thread::spawn(move || {
        for stream in server.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::debug!("live reload connection failed: {e}");
                    continue;
                }
            };

            let clients = clients.clone();
            thread::spawn(move || match handshake(stream) {
                Ok(socket) => {
                    tracing::debug!("live reload client connected");
                    clients
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(socket);
                }
                Err(e) => tracing::debug!("live reload handshake failed: {e}"),
            });
        }
    })
}

fn new_thread_ws_reload(clients: Clients) -> (Sender<String>, JoinHandle<()>) {
    let (tx, rx) = channel::<String>();

    let thread = thread::spawn(move || {
        while let Ok(path) = rx.recv() {
            let Some(message) = encode(&Command::reload(path)) else {
                continue;
            };

            let mut clients = clients.lock().unwrap_or_else(PoisonError::into_inner);
            clients.retain_mut(|socket| match socket.send(message.clone()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!("dropping live reload client: {e}");
                    false
                }
            });

            // Close all but the last 10 connections
            let len = clients.len();
            if len > MAX_CLIENTS {
                for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                    socket.close(None).ok();
                }
            }
        }
    });

    (tx, thread)
}
