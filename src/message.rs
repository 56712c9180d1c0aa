//! Structured diagnostics emitted by the context.
//!
//! Driver debug output and internal lifecycle anomalies are both expressed as
//! a [`DebugMessage`] and handed to a [`MessageSink`]. The sink decides what
//! to do with them; [`LogSink`] forwards to the [`log`] facade.

use std::fmt;

/// Where a diagnostic originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugSource {
    /// The graphics API itself.
    Api,
    /// The window-system binding layer.
    WindowSystem,
    /// The shader compiler.
    ShaderCompiler,
    /// A third-party tool or layer.
    ThirdParty,
    /// The application, including this crate's own anomaly reports.
    Application,
    /// Anything else.
    Other,
}

impl DebugSource {
    /// Map a `GL_DEBUG_SOURCE_*` value. Unknown values become [`Other`](Self::Other).
    #[must_use]
    pub fn from_gl(value: u32) -> Self {
        match value {
            glow::DEBUG_SOURCE_API => Self::Api,
            glow::DEBUG_SOURCE_WINDOW_SYSTEM => Self::WindowSystem,
            glow::DEBUG_SOURCE_SHADER_COMPILER => Self::ShaderCompiler,
            glow::DEBUG_SOURCE_THIRD_PARTY => Self::ThirdParty,
            glow::DEBUG_SOURCE_APPLICATION => Self::Application,
            _ => Self::Other,
        }
    }

    /// Suffix used after the `GlContext` prefix in formatted messages.
    fn label(self) -> &'static str {
        match self {
            Self::Api => ".OpenGL",
            Self::WindowSystem => ".WinSystem",
            Self::ShaderCompiler => ".GLSL",
            Self::ThirdParty => ".3rdParty",
            Self::Application => "",
            Self::Other => ".Other",
        }
    }
}

/// What kind of event a diagnostic describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugKind {
    /// An API error.
    Error,
    /// Use of deprecated behavior.
    Deprecated,
    /// Behavior the API leaves undefined.
    UndefinedBehavior,
    /// Something that will not port to other drivers.
    Portability,
    /// A performance warning.
    Performance,
    /// Anything else.
    Other,
}

impl DebugKind {
    /// Map a `GL_DEBUG_TYPE_*` value. Unknown values become [`Other`](Self::Other).
    #[must_use]
    pub fn from_gl(value: u32) -> Self {
        match value {
            glow::DEBUG_TYPE_ERROR => Self::Error,
            glow::DEBUG_TYPE_DEPRECATED_BEHAVIOR => Self::Deprecated,
            glow::DEBUG_TYPE_UNDEFINED_BEHAVIOR => Self::UndefinedBehavior,
            glow::DEBUG_TYPE_PORTABILITY => Self::Portability,
            glow::DEBUG_TYPE_PERFORMANCE => Self::Performance,
            _ => Self::Other,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Deprecated => "Deprecated",
            Self::UndefinedBehavior => "Undef. behavior",
            Self::Portability => "Portability",
            Self::Performance => "Performance",
            Self::Other => "Other",
        }
    }
}

/// How urgent a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational.
    Low,
    /// Worth a look.
    Medium,
    /// Something is broken.
    High,
}

impl Severity {
    /// Map a `GL_DEBUG_SEVERITY_*` value. Anything that is not high or
    /// medium (including notifications) is [`Low`](Self::Low).
    #[must_use]
    pub fn from_gl(value: u32) -> Self {
        match value {
            glow::DEBUG_SEVERITY_HIGH => Self::High,
            glow::DEBUG_SEVERITY_MEDIUM => Self::Medium,
            _ => Self::Low,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

/// One diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    /// Category of the emitter.
    pub source: DebugSource,
    /// Kind of event.
    pub kind: DebugKind,
    /// Numeric id, driver-defined for driver messages.
    pub id: u32,
    /// Urgency.
    pub severity: Severity,
    /// Human-readable text.
    pub text: String,
}

impl DebugMessage {
    /// Build a message from the raw values a GL debug callback receives.
    #[must_use]
    pub fn from_gl(source: u32, kind: u32, id: u32, severity: u32, text: &str) -> Self {
        Self {
            source: DebugSource::from_gl(source),
            kind: DebugKind::from_gl(kind),
            id,
            severity: Severity::from_gl(severity),
            text: text.to_owned(),
        }
    }
}

impl fmt::Display for DebugMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GlContext{} | Type: {} | ID: {} | Severity: {} | Message: {}",
            self.source.label(),
            self.kind.label(),
            self.id,
            self.severity.label(),
            self.text,
        )
    }
}

/// Receiver for diagnostics.
///
/// Sinks are `Send + Sync` because the driver may invoke its debug callback
/// from a thread of its own when synchronous output is not requested.
pub trait MessageSink: Send + Sync {
    /// Deliver one message.
    fn send(&self, message: &DebugMessage);
}

/// Default sink: forwards every message to the [`log`] facade.
///
/// High severity logs at `error`, medium at `warn`, low at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn send(&self, message: &DebugMessage) {
        match message.severity {
            Severity::High => log::error!("{message}"),
            Severity::Medium => log::warn!("{message}"),
            Severity::Low => log::info!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gl_enums_map_to_categories() {
        let msg = DebugMessage::from_gl(
            glow::DEBUG_SOURCE_SHADER_COMPILER,
            glow::DEBUG_TYPE_PERFORMANCE,
            7,
            glow::DEBUG_SEVERITY_MEDIUM,
            "slow path",
        );
        assert_eq!(msg.source, DebugSource::ShaderCompiler);
        assert_eq!(msg.kind, DebugKind::Performance);
        assert_eq!(msg.severity, Severity::Medium);
        assert_eq!(msg.id, 7);
    }

    #[test]
    fn unknown_enums_fall_back() {
        let msg = DebugMessage::from_gl(0, 0, 0, glow::DEBUG_SEVERITY_NOTIFICATION, "");
        assert_eq!(msg.source, DebugSource::Other);
        assert_eq!(msg.kind, DebugKind::Other);
        assert_eq!(msg.severity, Severity::Low);
    }

    #[test]
    fn display_layout() {
        let msg = DebugMessage {
            source: DebugSource::Api,
            kind: DebugKind::Error,
            id: 1282,
            severity: Severity::High,
            text: "invalid operation".to_owned(),
        };
        assert_eq!(
            msg.to_string(),
            "GlContext.OpenGL | Type: Error | ID: 1282 | Severity: High | Message: invalid operation"
        );
    }

    #[test]
    fn application_source_has_no_suffix() {
        let msg = DebugMessage {
            source: DebugSource::Application,
            kind: DebugKind::Other,
            id: 0,
            severity: Severity::Low,
            text: "x".to_owned(),
        };
        assert!(msg.to_string().starts_with("GlContext | Type: Other"));
    }
}
