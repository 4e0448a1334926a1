use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Every program reads the same settings and uses the sections it needs.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub queue: QueueSettings,
    pub http: HttpSettings,
    pub integrity: IntegritySettings,
    pub log: LogSettings,
}

/// Where the queue broker listens and where queue clients connect.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
}

impl BrokerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr())
    }
}

/// The queue both queue programs use.
#[derive(Debug, Deserialize, Clone)]
pub struct QueueSettings {
    pub name: String,
    /// Capacity of the bounded channel between the consumer task and the
    /// processing loop.
    pub prefetch: usize,
    pub demo_replacement: bool,
}

/// The HTTP receiver's bind address and the sender's target.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub request_timeout_ms: u64,
    pub max_concurrent_requests: usize,
    pub max_body_bytes: usize,
    pub demo_replacement: bool,
}

impl HttpSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr(), self.path)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntegritySettings {
    pub shared_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub queue: Option<PartialQueueSettings>,
    pub http: Option<PartialHttpSettings>,
    pub integrity: Option<PartialIntegritySettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialQueueSettings {
    pub name: Option<String>,
    pub prefetch: Option<usize>,
    pub demo_replacement: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHttpSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub max_concurrent_requests: Option<usize>,
    pub max_body_bytes: Option<usize>,
    pub demo_replacement: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialIntegritySettings {
    pub shared_secret: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Shared secret used when nothing is configured. Only suitable for local runs.
pub const DEFAULT_SHARED_SECRET: &str = "shared_secret_key";

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                host: "127.0.0.1".to_string(),
                port: 5672,
            },
            queue: QueueSettings {
                name: "pizzaQueue".to_string(),
                prefetch: 32,
                demo_replacement: true,
            },
            http: HttpSettings {
                host: "127.0.0.1".to_string(),
                port: 8000,
                path: "/pizza".to_string(),
                request_timeout_ms: 10_000,
                max_concurrent_requests: 64,
                max_body_bytes: 64 * 1024,
                demo_replacement: true,
            },
            integrity: IntegritySettings {
                shared_secret: DEFAULT_SHARED_SECRET.to_string(),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// True when no shared secret was configured and the built-in one is used.
    pub fn uses_default_secret(&self) -> bool {
        self.integrity.shared_secret == DEFAULT_SHARED_SECRET
    }
}

impl PartialSettings {
    /// Overlays the values that were provided onto `defaults`.
    pub fn merge_onto(self, defaults: Settings) -> Settings {
        let broker = self.broker.unwrap_or_default();
        let queue = self.queue.unwrap_or_default();
        let http = self.http.unwrap_or_default();
        let integrity = self.integrity.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            broker: BrokerSettings {
                host: broker.host.unwrap_or(defaults.broker.host),
                port: broker.port.unwrap_or(defaults.broker.port),
            },
            queue: QueueSettings {
                name: queue.name.unwrap_or(defaults.queue.name),
                prefetch: queue.prefetch.unwrap_or(defaults.queue.prefetch),
                demo_replacement: queue
                    .demo_replacement
                    .unwrap_or(defaults.queue.demo_replacement),
            },
            http: HttpSettings {
                host: http.host.unwrap_or(defaults.http.host),
                port: http.port.unwrap_or(defaults.http.port),
                path: http.path.unwrap_or(defaults.http.path),
                request_timeout_ms: http
                    .request_timeout_ms
                    .unwrap_or(defaults.http.request_timeout_ms),
                max_concurrent_requests: http
                    .max_concurrent_requests
                    .unwrap_or(defaults.http.max_concurrent_requests),
                max_body_bytes: http.max_body_bytes.unwrap_or(defaults.http.max_body_bytes),
                demo_replacement: http
                    .demo_replacement
                    .unwrap_or(defaults.http.demo_replacement),
            },
            integrity: IntegritySettings {
                shared_secret: integrity
                    .shared_secret
                    .unwrap_or(defaults.integrity.shared_secret),
            },
            log: LogSettings {
                level: log.level.unwrap_or(defaults.log.level),
            },
        }
    }
}
