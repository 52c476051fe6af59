//! Minimal IRC transport.
//!
//! Just enough of the protocol to register, join, answer pings, read
//! `PRIVMSG`s and send them. Outbound lines are queued on a channel owned by
//! the connection, so anything queued while disconnected is sent after the
//! next successful registration.

use std::time::Duration;

use async_trait::async_trait;
use nzbrelay_core::Announcer;
use nzbrelay_shared::{InboundMessage, IrcServerConfig, RelayError, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Line {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Line {
    /// Nick part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }
}

/// Parse a raw line. Message tags are skipped.
pub(crate) fn parse_line(raw: &str) -> Option<Line> {
    let mut rest = raw.trim_end_matches(['\r', '\n']);
    if let Some(tagged) = rest.strip_prefix('@') {
        rest = tagged.split_once(' ')?.1.trim_start();
    }

    let prefix = match rest.strip_prefix(':') {
        Some(prefixed) => {
            let (prefix, tail) = prefixed.split_once(' ')?;
            rest = tail.trim_start();
            Some(prefix.to_string())
        }
        None => None,
    };

    let (head, trailing) = match rest.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing)),
        None => (rest, None),
    };

    let mut words = head.split_whitespace();
    let command = words.next()?.to_ascii_uppercase();
    let mut params: Vec<String> = words.map(str::to_string).collect();
    if let Some(trailing) = trailing {
        params.push(trailing.to_string());
    }

    Some(Line {
        prefix,
        command,
        params,
    })
}

// ---------------------------------------------------------------------------
// Outbound handle
// ---------------------------------------------------------------------------

/// Cloneable handle that queues lines for a connection.
#[derive(Debug, Clone)]
pub(crate) struct IrcSender {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Announcer for IrcSender {
    async fn send(&self, channel: &str, text: &str) -> Result<()> {
        let text: String = text.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
        self.tx
            .send(format!("PRIVMSG {channel} :{text}"))
            .map_err(|_| RelayError::Transport("IRC connection task has stopped".into()))
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A reconnecting IRC connection.
pub(crate) struct IrcConnection {
    name: &'static str,
    config: IrcServerConfig,
    join: Vec<String>,
    password: Option<String>,
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::Sender<InboundMessage>>,
}

/// Create a connection and its outbound handle. `inbound` receives every
/// `PRIVMSG` when set.
pub(crate) fn connection(
    name: &'static str,
    config: IrcServerConfig,
    join: Vec<String>,
    inbound: Option<mpsc::Sender<InboundMessage>>,
) -> (IrcSender, IrcConnection) {
    let (tx, outbound) = mpsc::unbounded_channel();
    let password = config.password();
    (
        IrcSender { tx },
        IrcConnection {
            name,
            config,
            join,
            password,
            outbound,
            inbound,
        },
    )
}

impl IrcConnection {
    /// Connect and keep reconnecting until the attempt budget is spent.
    pub async fn run(mut self) -> Result<()> {
        let wait = Duration::from_millis(self.config.reconnect_wait_ms);
        let mut failures: u32 = 0;

        loop {
            let error = match self.session(&mut failures).await {
                Ok(()) => RelayError::Transport("connection closed by server".into()),
                Err(e) => e,
            };
            failures += 1;
            if failures > self.config.max_reconnect_attempts {
                return Err(RelayError::Transport(format!(
                    "{}: giving up after {} attempts: {error}",
                    self.name, self.config.max_reconnect_attempts
                )));
            }
            warn!(
                connection = self.name,
                attempt = failures,
                wait_ms = self.config.reconnect_wait_ms,
                %error,
                "disconnected, reconnecting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// One connection lifetime. Returns when the server closes the socket.
    async fn session(&mut self, failures: &mut u32) -> Result<()> {
        let Self {
            name,
            config,
            join,
            password,
            outbound,
            inbound,
        } = self;

        let addr = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| RelayError::Transport(format!("{addr}: {e}")))?;
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        let mut buf = Vec::new();

        if let Some(password) = password.as_deref() {
            send_raw(&mut write, &format!("PASS {password}")).await?;
        }
        send_raw(&mut write, &format!("NICK {}", config.nick)).await?;
        send_raw(
            &mut write,
            &format!("USER {0} 0 * :{0}", config.username),
        )
        .await?;
        info!(connection = *name, %addr, nick = %config.nick, "connected, registering");

        let mut registered = false;
        loop {
            tokio::select! {
                // Partial reads stay in `buf` if the other branch wins.
                read = reader.read_until(b'\n', &mut buf) => {
                    let n = read.map_err(|e| RelayError::Transport(format!("{addr}: {e}")))?;
                    if n == 0 {
                        return Ok(());
                    }
                    // Chat text is not guaranteed to be UTF-8.
                    let raw = String::from_utf8_lossy(&buf).into_owned();
                    buf.clear();
                    let Some(line) = parse_line(&raw) else {
                        continue;
                    };
                    match line.command.as_str() {
                        "PING" => {
                            let token = line.params.first().map(String::as_str).unwrap_or_default();
                            send_raw(&mut write, &format!("PONG :{token}")).await?;
                        }
                        "001" => {
                            registered = true;
                            *failures = 0;
                            for channel in join.iter() {
                                send_raw(&mut write, &format!("JOIN {channel}")).await?;
                            }
                            info!(connection = *name, channels = ?join, "registered");
                        }
                        "PRIVMSG" => {
                            if let (Some(tx), Some(nick), Some(text)) =
                                (inbound.as_ref(), line.nick(), line.params.get(1))
                            {
                                let message = InboundMessage::new(nick, text.as_str());
                                if tx.send(message).await.is_err() {
                                    debug!(connection = *name, "inbound receiver dropped");
                                }
                            }
                        }
                        "ERROR" => {
                            let reason = line.params.last().cloned().unwrap_or_default();
                            return Err(RelayError::Transport(format!("server error: {reason}")));
                        }
                        _ => {}
                    }
                }
                Some(out) = outbound.recv(), if registered => {
                    send_raw(&mut write, &out).await?;
                }
            }
        }
    }
}

async fn send_raw(write: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    write
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .map_err(|e| RelayError::Transport(e.to_string()))
}
