//! Configuration for the encoder and transformer processes.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| String::from(default))
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// `encoder-{host}-{pid}`, so workers sharing a broker never share a processing list.
fn default_consumer() -> String {
    let host = optional_var("HOSTNAME").unwrap_or_else(|| String::from("localhost"));
    format!("encoder-{}-{}", host, std::process::id())
}

/// Message broker settings, owned by the channel built from them.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Prefix of every key the channel touches
    pub namespace: String,
    /// Names this consumer's processing list. Unique per process by default;
    /// give each worker a stable name to take back its unsettled deliveries after a restart.
    pub consumer: String,
    /// Blocking pop timeout, in seconds
    pub poll_timeout_secs: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            redis_url: String::from("redis://127.0.0.1/"),
            namespace: String::from("vidcast"),
            consumer: default_consumer(),
            poll_timeout_secs: 5.0,
        }
    }
}

impl ChannelConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: var_or("REDIS_URL", &defaults.redis_url),
            namespace: var_or("CHANNEL_NAMESPACE", &defaults.namespace),
            consumer: var_or("CHANNEL_CONSUMER", &defaults.consumer),
            poll_timeout_secs: env::var("CHANNEL_POLL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|secs| *secs > 0.0)
                .unwrap_or(defaults.poll_timeout_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StorageConfig {
    /// Objects are files under `root`
    Local { root: PathBuf },
    /// S3 bucket; `endpoint` targets S3-compatible servers such as MinIO
    S3 {
        bucket: String,
        endpoint: Option<String>,
    },
}

impl StorageConfig {
    pub fn from_env() -> Self {
        match var_or("STORAGE", "local").to_ascii_lowercase().as_str() {
            "s3" => StorageConfig::S3 {
                bucket: var_or("S3_BUCKET", "videos"),
                endpoint: optional_var("S3_ENDPOINT"),
            },
            _ => StorageConfig::Local {
                root: PathBuf::from(var_or("UPLOAD_DIR", "./videos")),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolverConfig {
    Consul {
        url: String,
        credentials: Option<(String, String)>,
    },
    /// `name=host:port` pairs separated by commas
    Static { table: String },
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        match var_or("RESOLVER", "consul").to_ascii_lowercase().as_str() {
            "static" => ResolverConfig::Static {
                table: var_or("STATIC_SERVICES", ""),
            },
            _ => ResolverConfig::Consul {
                url: var_or("CONSUL_URL", "http://127.0.0.1:8500"),
                credentials: optional_var("CONSUL_USER")
                    .map(|user| (user, var_or("CONSUL_PWD", ""))),
            },
        }
    }
}

/// Configuration of the encode worker process.
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    pub channel: ChannelConfig,
    pub storage: StorageConfig,
    /// Scratch directory, unique to the process
    pub workdir: PathBuf,
    /// Upper bound on one transcode run; none when unset
    pub encode_timeout: Option<Duration>,
    pub ffmpeg: String,
    pub ffprobe: String,
    /// Health endpoint bind address
    pub health_addr: String,
}

impl EncoderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let workdir = optional_var("ENCODER_WORKDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                env::temp_dir().join(format!("encoder-processing-dir-{}", std::process::id()))
            });

        Self {
            channel: ChannelConfig::from_env(),
            storage: StorageConfig::from_env(),
            workdir,
            encode_timeout: env::var("ENCODE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            ffmpeg: var_or("FFMPEG_PATH", "ffmpeg"),
            ffprobe: var_or("FFPROBE_PATH", "ffprobe"),
            health_addr: var_or("HEALTH_ADDR", "0.0.0.0:8081"),
        }
    }
}

/// Configuration of one transformer hop.
#[derive(Clone, Debug)]
pub struct TransformerConfig {
    /// Effect served by this hop, also its service name
    pub effect: String,
    /// gRPC bind address
    pub addr: String,
    /// gRPC port
    pub port: u16,
    /// Address registered with the resolver; defaults to `addr`
    pub advertise_addr: String,
    pub storage: StorageConfig,
    pub resolver: ResolverConfig,
    pub ffmpeg: String,
    pub health_addr: String,
}

impl TransformerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let addr = var_or("ADDR", "0.0.0.0");
        Self {
            effect: var_or("TRANSFORMER", "flip"),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(50051),
            advertise_addr: optional_var("ADVERTISE_ADDR").unwrap_or_else(|| addr.clone()),
            addr,
            storage: StorageConfig::from_env(),
            resolver: ResolverConfig::from_env(),
            ffmpeg: var_or("FFMPEG_PATH", "ffmpeg"),
            health_addr: var_or("HEALTH_ADDR", "0.0.0.0:8082"),
        }
    }
}
