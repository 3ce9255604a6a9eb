//! Configuration management for the booking relay.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::coordinator::{CoordinatorConfig, DEFAULT_COMPLETED_TOPIC, DEFAULT_STARTED_TOPIC};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Redis pub/sub configuration
    pub redis: RedisConfig,
    /// Application server configuration
    pub server: ServerConfig,
    /// Booking flow configuration
    pub booking: BookingConfig,
}

/// Redis configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Messages buffered per subscription before backpressure
    pub subscription_buffer_size: usize,
    /// Seconds between readiness PINGs
    pub health_check_interval: u64,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Booking flow configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingConfig {
    /// Topic start events are published on
    pub started_topic: String,
    /// Topic completion events are awaited on
    pub completed_topic: String,
    /// Seconds to wait for a completion event
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let parsed = |key: &str, default| parse_or(lookup(key), default);

        Self {
            redis: RedisConfig {
                url: string("REDIS_URL", "redis://localhost:6379"),
                connect_timeout: parsed("REDIS_CONNECT_TIMEOUT", 10),
                subscription_buffer_size: parse_or(lookup("SUBSCRIPTION_BUFFER_SIZE"), 64_usize)
                    .max(1),
                health_check_interval: parsed("REDIS_HEALTH_CHECK_INTERVAL", 5_u64).max(1),
            },
            server: ServerConfig {
                host: string("HOST", "0.0.0.0"),
                port: parse_or(lookup("PORT"), 3000),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT", 10),
            },
            booking: BookingConfig {
                started_topic: string("BOOKING_STARTED_TOPIC", DEFAULT_STARTED_TOPIC),
                completed_topic: string("PAYMENT_COMPLETED_TOPIC", DEFAULT_COMPLETED_TOPIC),
                timeout_secs: parsed("BOOKING_TIMEOUT_SECS", 30),
            },
        }
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Coordinator settings derived from the booking section.
    #[must_use]
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            started_topic: self.booking.started_topic.clone(),
            completed_topic: self.booking.completed_topic.clone(),
            timeout: Duration::from_secs(self.booking.timeout_secs),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}
