use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "config")]
use serde::Deserialize;

use crate::channel::handler::ErrorHandler;
use crate::channel::Channel;
use crate::core::{Error, Result};
use crate::tracker::{MessageTracker, NoopTracker};

/// What `send` does when a bounded channel is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "config",
    derive(Deserialize),
    serde(tag = "mode", rename_all = "snake_case")
)]
pub enum BackpressurePolicy {
    /// Reject immediately with [`Error::QueueFull`].
    FailFast,
    /// Wait for room; `None` waits until room frees or the channel closes.
    Block {
        #[cfg_attr(feature = "config", serde(default, rename = "timeout_ms", with = "opt_millis"))]
        timeout: Option<Duration>,
    },
}

impl BackpressurePolicy {
    pub(crate) fn timeout(self) -> Option<Duration> {
        match self {
            BackpressurePolicy::FailFast => Some(Duration::ZERO),
            BackpressurePolicy::Block { timeout } => timeout,
        }
    }
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        BackpressurePolicy::Block { timeout: None }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Deserialize), serde(default))]
pub struct ChannelConfig {
    pub name: String,
    /// `None` is unbounded.
    pub max_message_count: Option<usize>,
    pub backpressure: BackpressurePolicy,
    // Pin the delivery thread to this CPU core, if available.
    pub core_id: Option<usize>,
    // Defaults to `<name>-delivery`.
    pub thread_name: Option<String>,
}

impl ChannelConfig {
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn bounded(name: impl Into<String>, max_message_count: usize) -> Self {
        Self {
            name: name.into(),
            max_message_count: Some(max_message_count),
            ..Self::default()
        }
    }

    /// Load a JSON config file.
    #[cfg(feature = "config")]
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("channel name must not be empty".to_string()));
        }
        if matches!(&self.thread_name, Some(name) if name.contains('\0')) {
            return Err(Error::Config("thread name must not contain NUL".to_string()));
        }
        Ok(())
    }

    pub(crate) fn delivery_thread_name(&self) -> String {
        self.thread_name
            .clone()
            .unwrap_or_else(|| format!("{}-delivery", self.name))
    }
}

/// Builds a [`Channel`]. A name and an error handler are required.
pub struct ChannelBuilder {
    config: ChannelConfig,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    tracker: Arc<dyn MessageTracker>,
}

impl ChannelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(ChannelConfig::unbounded(name))
    }

    pub fn from_config(config: ChannelConfig) -> Self {
        Self {
            config,
            error_handler: None,
            tracker: Arc::new(NoopTracker),
        }
    }

    pub fn error_handler(self, handler: impl ErrorHandler + 'static) -> Self {
        self.shared_error_handler(Arc::new(handler))
    }

    pub fn shared_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn tracker(mut self, tracker: impl MessageTracker + 'static) -> Self {
        self.tracker = Arc::new(tracker);
        self
    }

    pub fn max_message_count(mut self, max_message_count: Option<usize>) -> Self {
        self.config.max_message_count = max_message_count;
        self
    }

    pub fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.config.backpressure = policy;
        self
    }

    pub fn core_id(mut self, core_id: usize) -> Self {
        self.config.core_id = Some(core_id);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = Some(name.into());
        self
    }

    /// Validate the configuration and create a closed channel.
    pub fn build(self) -> Result<Channel> {
        self.config.validate()?;
        let error_handler = self
            .error_handler
            .ok_or_else(|| Error::Config("an error handler is required".to_string()))?;
        Ok(Channel::from_parts(self.config, error_handler, self.tracker))
    }
}

#[cfg(feature = "config")]
mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
