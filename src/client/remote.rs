//! Line-protocol client
//!
//! Connects to a broker, announces itself with a `ROLE:TOPIC` handshake, then
//! sends lines (publisher) or receives envelopes (subscriber). `run_interactive`
//! wires stdin/stdout to the connection for the `client` subcommand.

use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::thread;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::debug;

use crate::broker::topic::Role;
use crate::transport::message::{Handshake, TERMINATE, is_terminate};
use crate::utils::error::BrokerError;

pub struct PubSubClient {
    role: Role,
    topic: String,
    local_addr: SocketAddr,
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: OwnedWriteHalf,
}

impl PubSubClient {
    /// Connects to `addr` and sends the handshake for `role` on `topic`.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        role: Role,
        topic: &str,
    ) -> Result<Self, BrokerError> {
        let handshake = Handshake::new(role, topic)?;
        let stream = TcpStream::connect(addr).await?;
        let local_addr = stream.local_addr()?;
        let (reader, writer) = stream.into_split();

        let mut client = Self {
            role,
            topic: handshake.topic.clone(),
            local_addr,
            lines: FramedRead::new(reader, LinesCodec::new()),
            writer,
        };
        client.send(&handshake.to_string()).await?;
        debug!(%local_addr, %role, topic = %client.topic, "handshake sent");
        Ok(client)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The address the broker sees for this client.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends one line; the newline is appended here.
    pub async fn send(&mut self, line: &str) -> Result<(), BrokerError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next line from the broker, or `None` once the broker closed the connection.
    pub async fn next_message(&mut self) -> Result<Option<String>, BrokerError> {
        match self.lines.next().await {
            Some(line) => Ok(Some(line?)),
            None => Ok(None),
        }
    }

    /// Sends the terminate command and closes the write side.
    pub async fn terminate(mut self) -> Result<(), BrokerError> {
        self.send(TERMINATE).await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Forwards stdin lines to the broker and prints every line the broker
    /// sends back, until `terminate` is typed, stdin ends or the broker
    /// disconnects.
    pub async fn run_interactive(mut self) -> Result<(), BrokerError> {
        match self.role {
            Role::Subscriber => println!("Listening for messages on topic '{}'...", self.topic),
            Role::Publisher => println!("Ready to publish messages on topic '{}'", self.topic),
        }
        println!("Type your messages (type '{TERMINATE}' to quit):");

        let mut input = spawn_stdin_reader();
        loop {
            tokio::select! {
                line = input.recv() => match line {
                    Some(line) => {
                        let line = line?;
                        self.send(&line).await?;
                        if is_terminate(&line) {
                            println!("Terminating connection...");
                            break;
                        }
                    }
                    None => break,
                },
                incoming = self.lines.next() => match incoming {
                    Some(Ok(message)) => println!("{}", message.trim()),
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        println!("Server disconnected");
                        break;
                    }
                },
            }
        }

        if let Err(e) = self.writer.shutdown().await {
            debug!(error = %e, "shutdown after session end failed");
        }
        Ok(())
    }
}

/// Reads stdin on a plain thread so a pending read never holds up runtime
/// shutdown once the broker has gone away.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
