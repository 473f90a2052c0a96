use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::{Address, Connector};
use crate::{ConstructionError, Deadline};

/// Options applied to every call made through a connection.
///
/// `chunk_tensors` and `propagate_deadline` are accepted and carried along
/// but do not change behavior yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallOptions {
    /// Ask the transport to compress requests.
    pub compress: bool,

    /// Timeout applied to every call. `None` (or zero) means no timeout.
    pub timeout: Option<Duration>,

    /// Wait for the server to become reachable instead of failing fast.
    pub wait_for_ready: bool,

    pub chunk_tensors: bool,

    /// Load balancing policy handed to the transport, e.g. `round_robin`.
    pub load_balancing_policy: Option<String>,

    pub propagate_deadline: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            compress: false,
            timeout: None,
            wait_for_ready: true,
            chunk_tensors: false,
            load_balancing_policy: None,
            propagate_deadline: true,
        }
    }
}

impl CallOptions {
    /// The timeout to apply, with a zero timeout treated as none.
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    /// Deadline for a call made now, honoring per-call overrides.
    pub fn deadline_for(&self, overrides: &CallOverrides) -> Deadline {
        let timeout = match overrides.timeout {
            Some(timeout) => Some(timeout).filter(|t| !t.is_zero()),
            None => self.effective_timeout(),
        };
        tracing::trace!(
            ?timeout,
            inherited = ?overrides.deadline,
            propagate_deadline = self.propagate_deadline,
            "computing call deadline"
        );
        Deadline::compute(timeout, overrides.deadline)
    }
}

/// Per-call overrides of the connection's [`CallOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOverrides {
    pub timeout: Option<Duration>,

    /// Deadline inherited from an enclosing call. The call's deadline will
    /// never be later than this.
    pub deadline: Option<Deadline>,

    pub wait_for_ready: Option<bool>,

    pub compress: Option<bool>,
}

impl CallOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn wait_for_ready(mut self, wait_for_ready: bool) -> Self {
        self.wait_for_ready = Some(wait_for_ready);
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }
}

/// The parameters a [`Connection`](crate::Connection) was constructed from.
///
/// A config can be serialized, sent to another process and connected there
/// to obtain an equivalent connection with its own transport.
///
/// Parse from a bare address:
/// ```
/// # use courier::ConnectionConfig;
/// # use std::str::FromStr;
/// let config = ConnectionConfig::from_str("localhost:9000").unwrap();
/// assert_eq!(config.address(), "localhost:9000");
/// ```
///
/// Parse from JSON:
/// ```
/// # use courier::ConnectionConfig;
/// # use std::str::FromStr;
/// let config = ConnectionConfig::from_str(
///     r#"{"address": "my_server", "options": {"compress": true}}"#,
/// )
/// .unwrap();
/// assert!(config.options().compress);
/// assert!(config.options().wait_for_ready);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    address: String,
    #[serde(default)]
    options: CallOptions,
}

impl ConnectionConfig {
    pub fn new(address: impl ToString) -> Self {
        Self {
            address: address.to_string(),
            options: CallOptions::default(),
        }
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.options.compress = compress;
        self
    }

    /// Timeout applied to every call. A zero timeout disables it.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Timeout in (fractional) seconds. Zero, negative or non-finite values
    /// disable it.
    pub fn call_timeout_secs(mut self, secs: f64) -> Self {
        self.options.timeout = Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|t| !t.is_zero());
        self
    }

    pub fn wait_for_ready(mut self, wait_for_ready: bool) -> Self {
        self.options.wait_for_ready = wait_for_ready;
        self
    }

    pub fn chunk_tensors(mut self, chunk_tensors: bool) -> Self {
        self.options.chunk_tensors = chunk_tensors;
        self
    }

    pub fn load_balancing_policy(mut self, policy: impl ToString) -> Self {
        self.options.load_balancing_policy = Some(policy.to_string());
        self
    }

    pub fn propagate_deadline(mut self, propagate_deadline: bool) -> Self {
        self.options.propagate_deadline = propagate_deadline;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// Parse the address without connecting.
    pub fn parse_address(&self) -> Result<Address, ConstructionError> {
        Address::parse(&self.address)
    }

    /// Connect using the given connector.
    pub fn connect(
        self,
        connector: Arc<dyn Connector>,
    ) -> Result<crate::Connection, ConstructionError> {
        crate::Connection::connect(self, connector)
    }
}

impl FromStr for ConnectionConfig {
    type Err = ConstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if trimmed.starts_with('{') {
            let config: ConnectionConfig = serde_json::from_str(trimmed)?;
            config.parse_address()?;
            return Ok(config);
        }

        Address::parse(trimmed)?;
        Ok(ConnectionConfig::new(trimmed))
    }
}
