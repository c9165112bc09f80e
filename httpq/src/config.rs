use std::env;
use std::str::FromStr;

use crate::error::Error;

/// Environment variable overriding [`Config::initial_buffer_size`].
pub const ENV_BUFFER_SIZE: &str = "HTTPQ_BUFFER_SIZE";
/// Environment variable overriding [`Config::request_queue_length`].
pub const ENV_REQUEST_QUEUE_LENGTH: &str = "HTTPQ_REQUEST_QUEUE_LENGTH";
/// Environment variable overriding [`Config::pending_accepts`].
pub const ENV_PENDING_READ_COUNT: &str = "HTTPQ_PENDING_READ_COUNT";
/// Environment variable overriding [`Config::cache_duration`].
pub const ENV_CACHE_DURATION: &str = "HTTPQ_CACHE_DURATION";

/// Configuration for a [`Host`](crate::Host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Receive buffer size for each request, in bytes. The request head must
    /// fit; body reads are delivered in pieces of at most this size.
    pub initial_buffer_size: u32,
    /// Kernel-side queue length applied when a queue is created.
    pub request_queue_length: u32,
    /// Number of new-request receives kept outstanding per listener.
    pub pending_accepts: u32,
    /// Response cache duration in seconds. Negative disables kernel caching;
    /// otherwise it is the default TTL, overridable per header write.
    pub cache_duration: i64,
    /// Capacity of the request context table. Bounds the number of requests
    /// in flight across all listeners.
    pub max_requests: u32,
    /// Upper bound on bytes held by response descriptors and chunk buffers.
    /// 0 = unlimited.
    pub response_memory_limit: usize,
    /// Initial capacity of the completion batch drained per poll.
    pub completion_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_buffer_size: 4096,
            request_queue_length: 5000,
            pending_accepts: 1,
            cache_duration: -1,
            max_requests: 4096,
            response_memory_limit: 0,
            completion_batch: 64,
        }
    }
}

impl Config {
    /// Defaults overridden by the `HTTPQ_*` environment variables that are
    /// set. The result is validated.
    pub fn from_env() -> Result<Config, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(v) = parse_var(&lookup, ENV_BUFFER_SIZE)? {
            config.initial_buffer_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_REQUEST_QUEUE_LENGTH)? {
            config.request_queue_length = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_PENDING_READ_COUNT)? {
            config.pending_accepts = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_CACHE_DURATION)? {
            config.cache_duration = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.initial_buffer_size == 0 {
            return Err(Error::Config("initial_buffer_size must be > 0".into()));
        }
        if self.request_queue_length == 0 {
            return Err(Error::Config("request_queue_length must be > 0".into()));
        }
        if self.pending_accepts == 0 {
            return Err(Error::Config("pending_accepts must be > 0".into()));
        }
        if self.cache_duration > u32::MAX as i64 {
            return Err(Error::Config("cache_duration must fit in 32 bits".into()));
        }
        if self.max_requests == 0 || self.max_requests >= (1 << 24) {
            return Err(Error::Config(
                "max_requests must be > 0 and < 2^24".into(),
            ));
        }
        Ok(())
    }

    /// Default kernel cache TTL in seconds, or `None` when caching is
    /// disabled.
    pub fn cache_ttl(&self) -> Option<u32> {
        u32::try_from(self.cache_duration).ok()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, Error>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key}: invalid value {raw:?}"))),
    }
}

/// Builder for [`Config`].
///
/// ```
/// use httpq::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .initial_buffer_size(8192)
///     .pending_accepts(4)
///     .cache_duration(30)
///     .build()
///     .expect("invalid config");
/// ```
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Set the per-request receive buffer size.
    pub fn initial_buffer_size(mut self, n: u32) -> Self {
        self.config.initial_buffer_size = n;
        self
    }

    /// Set the number of outstanding new-request receives per listener.
    pub fn pending_accepts(mut self, n: u32) -> Self {
        self.config.pending_accepts = n;
        self
    }

    /// Set the request context table capacity.
    pub fn max_requests(mut self, n: u32) -> Self {
        self.config.max_requests = n;
        self
    }

    // ── Queue ────────────────────────────────────────────────────────

    /// Set the kernel queue length used when creating a queue.
    pub fn request_queue_length(mut self, n: u32) -> Self {
        self.config.request_queue_length = n;
        self
    }

    // ── Responses ────────────────────────────────────────────────────

    /// Set the default response cache TTL in seconds. Negative disables
    /// caching.
    pub fn cache_duration(mut self, secs: i64) -> Self {
        self.config.cache_duration = secs;
        self
    }

    /// Cap the memory held by in-flight response buffers. 0 = unlimited.
    pub fn response_memory_limit(mut self, bytes: usize) -> Self {
        self.config.response_memory_limit = bytes;
        self
    }

    /// Set the completion batch capacity.
    pub fn completion_batch(mut self, n: usize) -> Self {
        self.config.completion_batch = n;
        self
    }

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Get mutable access to the underlying config for fields not covered
    /// by builder methods.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    // ── Terminal ─────────────────────────────────────────────────────

    /// Validate and build the final [`Config`].
    pub fn build(self) -> Result<Config, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}
