use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the listener, the broker and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to. The port is normally
/// supplied on the command line.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the broker.
///
/// Bounds the worker pool and controls shutdown and delivery timing.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub max_connections: usize,
    pub shutdown_grace_secs: u64,
    pub write_timeout_ms: u64,
    pub max_line_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub shutdown_grace_secs: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub max_line_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            broker: BrokerSettings {
                max_connections: 1000,
                shutdown_grace_secs: 5,
                write_timeout_ms: 5000,
                max_line_bytes: 64 * 1024,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Overlays whatever `partial` specifies on top of `self`.
    pub fn merge(self, partial: PartialSettings) -> Self {
        let server = partial.server;
        let broker = partial.broker;
        let logging = partial.logging;

        Self {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(self.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(self.server.port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .as_ref()
                    .and_then(|b| b.max_connections)
                    .unwrap_or(self.broker.max_connections),
                shutdown_grace_secs: broker
                    .as_ref()
                    .and_then(|b| b.shutdown_grace_secs)
                    .unwrap_or(self.broker.shutdown_grace_secs),
                write_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.write_timeout_ms)
                    .unwrap_or(self.broker.write_timeout_ms),
                max_line_bytes: broker
                    .as_ref()
                    .and_then(|b| b.max_line_bytes)
                    .unwrap_or(self.broker.max_line_bytes),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(self.logging.level),
            },
        }
    }
}
