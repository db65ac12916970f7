// Logging utilities for the keyring engine
//
// This module provides a small structured logging layer with:
// - Component-based categorization
// - A context id (usually the master key id) carried by every logger
// - Child loggers that inherit the context of their parent
// - Optional subject tracing (user id, subkey id) per logger

use log::{debug, error, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Arguments, Display, Formatter};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Component {
    Codec,
    Armor,
    Verifier,
    Canonicalizer,
    KeyOperation,
    Batch,
    Keys,
    System,
    Custom(&'static str),
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Codec => "Codec",
            Component::Armor => "Armor",
            Component::Verifier => "Verifier",
            Component::Canonicalizer => "Canonicalize",
            Component::KeyOperation => "KeyOp",
            Component::Batch => "Batch",
            Component::Keys => "Keys",
            Component::System => "System",
            Component::Custom(name) => name,
        }
    }
}

// Lightweight Display helpers to avoid prefix String allocations
struct ComponentPrefixDisplay {
    parent: Option<Component>,
    component: Component,
}

impl Display for ComponentPrefixDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != Component::System => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())
            }
            _ => write!(f, "{}", self.component.as_str()),
        }
    }
}

struct MaybeSubjectDisplay<'a>(Option<&'a str>);

impl Display for MaybeSubjectDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(subject) = self.0 {
            write!(f, "|subject={subject}")
        } else {
            Ok(())
        }
    }
}

/// A helper for creating component-specific loggers with context tracking
#[derive(Clone, Debug)]
pub struct Logger {
    /// Component this logger is for
    component: Component,
    /// Context id, usually the master key id of the ring being processed
    context_id: String,
    /// Parent component for hierarchical logging (if any)
    parent_component: Option<Component>,
    /// Subject of the current step (user id, subkey id)
    subject: Option<String>,
}

impl Logger {
    /// Create a new root logger for a specific component and context id
    pub fn new_root(component: Component, context_id: &str) -> Self {
        Self {
            component,
            context_id: context_id.to_string(),
            parent_component: None,
            subject: None,
        }
    }

    /// Create a child logger with the same context but a different component
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            context_id: self.context_id.clone(),
            parent_component: Some(self.component),
            subject: self.subject.clone(),
        }
    }

    /// Create a logger bound to another context id (e.g. once the master key
    /// of a ring is known)
    pub fn with_context(&self, context_id: impl Into<String>) -> Self {
        Self {
            component: self.component,
            context_id: context_id.into(),
            parent_component: self.parent_component,
            subject: self.subject.clone(),
        }
    }

    /// Create a logger with a subject attached to every line
    pub fn with_subject(&self, subject: impl Into<String>) -> Self {
        Self {
            component: self.component,
            context_id: self.context_id.clone(),
            parent_component: self.parent_component,
            subject: Some(subject.into()),
        }
    }

    /// Get a reference to the context id
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Get a reference to the subject if available
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Get the component of this logger
    pub fn component(&self) -> Component {
        self.component
    }

    fn prefix(&self) -> ComponentPrefixDisplay {
        ComponentPrefixDisplay {
            parent: self.parent_component,
            component: self.component,
        }
    }

    /// Log a debug message
    pub fn debug(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Debug) {
            self.debug_args(format_args!("{}", message.into()));
        }
    }

    /// Log a debug message using fmt::Arguments (avoids allocating message String)
    pub fn debug_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "[{}][{}{}] {}",
                self.context_id,
                self.prefix(),
                MaybeSubjectDisplay(self.subject()),
                args
            );
        }
    }

    /// Log an info message
    pub fn info(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Info) {
            self.info_args(format_args!("{}", message.into()));
        }
    }

    /// Log an info message using fmt::Arguments (avoids allocating message String)
    pub fn info_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Info) {
            info!(
                "[{}][{}{}] {}",
                self.context_id,
                self.prefix(),
                MaybeSubjectDisplay(self.subject()),
                args
            );
        }
    }

    /// Log a warning message
    pub fn warn(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Warn) {
            self.warn_args(format_args!("{}", message.into()));
        }
    }

    /// Log a warning using fmt::Arguments
    pub fn warn_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Warn) {
            warn!(
                "[{}][{}{}] {}",
                self.context_id,
                self.prefix(),
                MaybeSubjectDisplay(self.subject()),
                args
            );
        }
    }

    /// Log an error message
    pub fn error(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Error) {
            self.error_args(format_args!("{}", message.into()));
        }
    }

    /// Log an error using fmt::Arguments
    pub fn error_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Error) {
            error!(
                "[{}][{}{}] {}",
                self.context_id,
                self.prefix(),
                MaybeSubjectDisplay(self.subject()),
                args
            );
        }
    }
}

/// Log verbosity used by [`LoggingConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

/// Logging configuration applied through `env_logger`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set
    pub default_level: LogLevel,
    /// Format output for test harness capture
    pub is_test: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::default_info()
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default_info()
    }

    /// Info level, regular output
    pub fn default_info() -> Self {
        Self {
            default_level: LogLevel::Info,
            is_test: false,
        }
    }

    pub fn with_default_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Route output through the test harness capture
    pub fn for_tests(mut self) -> Self {
        self.is_test = true;
        self
    }

    /// Install the global logger. Returns false when a logger was already
    /// installed, which is expected when several tests share a process.
    pub fn apply(&self) -> bool {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.default_level.to_level_filter());
        if let Ok(spec) = std::env::var("RUST_LOG") {
            builder.parse_filters(&spec);
        }
        builder.is_test(self.is_test);
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_logger_keeps_context() {
        let root = Logger::new_root(Component::System, "ABCDEF0123456789");
        let child = root
            .with_component(Component::Canonicalizer)
            .with_subject("uid:alice");

        assert_eq!(child.context_id(), "ABCDEF0123456789");
        assert_eq!(child.subject(), Some("uid:alice"));
        assert_eq!(child.component(), Component::Canonicalizer);
        assert!(root.subject().is_none());
    }

    #[test]
    fn test_prefix_skips_system_parent() {
        let root = Logger::new_root(Component::System, "ctx");
        let child = root.with_component(Component::Codec);
        assert_eq!(child.prefix().to_string(), "Codec");

        let grandchild = child.with_component(Component::Armor);
        assert_eq!(grandchild.prefix().to_string(), "Codec.Armor");
    }

    #[test]
    fn test_log_level_filters() {
        assert_eq!(LogLevel::Warn.to_level_filter(), LevelFilter::Warn);
        assert_eq!(LogLevel::Off.to_level_filter(), LevelFilter::Off);
        let config = LoggingConfig::new().with_default_level(LogLevel::Debug);
        assert_eq!(config.default_level, LogLevel::Debug);
    }
}
