//! CLI configuration.
//!
//! A single flat [`Args`] struct, mirroring the `CliCommandProxy` shape
//! used throughout this ecosystem's own CLI tools: every tunable is an
//! optional flag with a sane default so the executable runs with no
//! required arguments, per spec.md §6.

use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "mitm-proxy")]
#[command(version, about = "Interactive MITM HTTP/HTTPS proxy", long_about = None)]
pub struct Args {
    /// address the proxy listens on for client connections
    #[arg(long, env = "MITM_PROXY_BIND", default_value = "127.0.0.1:8888")]
    pub proxy_bind: String,

    /// address the control-plane REST surface listens on
    #[arg(long, env = "MITM_PROXY_API_BIND", default_value = "127.0.0.1:9000")]
    pub api_bind: String,

    /// path to the CA certificate (generated if absent)
    #[arg(long, env = "MITM_PROXY_CA_CERT", default_value = "ca_cert.pem")]
    pub ca_cert: String,

    /// path to the CA private key (generated if absent)
    #[arg(long, env = "MITM_PROXY_CA_KEY", default_value = "ca_key.pem")]
    pub ca_key: String,

    /// directory leaf certificates are cached under
    #[arg(long, env = "MITM_PROXY_CERT_CACHE_DIR", default_value = "certs")]
    pub cert_cache_dir: String,

    /// connection string for the backing decision store, e.g. redis://127.0.0.1:6379
    #[arg(long, env = "MITM_PROXY_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// use a process-local in-memory decision store instead of connecting to redis
    #[arg(long, env = "MITM_PROXY_MEMORY_STORE", default_value_t = false)]
    pub memory_store: bool,

    /// poll cadence, in milliseconds, while a worker awaits a decision
    #[arg(long, default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// maximum time, in seconds, a worker waits for a single decision
    #[arg(long, default_value_t = 60)]
    pub decision_timeout_secs: u64,

    /// timeout, in seconds, for the upstream connection/request
    #[arg(long, default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    /// verify the upstream server's TLS certificate (disabled by default: this is a MITM proxy)
    #[arg(long, default_value_t = false)]
    pub verify_upstream_tls: bool,

    /// size, in bytes, of the initial read used to parse a request head
    #[arg(long, default_value_t = 4096)]
    pub read_buffer_size: usize,

    /// reject upstream responses whose body exceeds this many bytes
    #[arg(long, default_value_t = 8 * 1024 * 1024)]
    pub max_response_body_bytes: usize,
}

impl Args {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
