//! Error types for the provider gateway.

use std::time::Duration;
use thiserror::Error;

/// Wire-level details salvaged from a failed exchange, kept so a failure
/// can be traced in provider logs or support tickets. Populated field by
/// field as the response is decoded; anything the server did not send
/// stays `None`.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Status line of the failing response.
    pub http_status: Option<u16>,
    /// Error code the server put in its body, like "rate_limit_exceeded".
    pub provider_code: Option<String>,
    /// The x-request-id the server echoed back, when present.
    pub request_id: Option<String>,
}

/// Errors that can occur when calling the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 429. Carries the server's retry-after hint when one was sent.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Option<Duration>,
        context: Option<ErrorContext>,
    },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Structurally invalid provider response: empty content, undecodable
    /// body, oversized payload. Never retried.
    #[error("invalid provider response: {message}")]
    Validation { message: String },

    /// HTTP error with a server-provided message. Retryable iff 5xx.
    #[error("provider returned HTTP {status}: {message}")]
    RemoteApi {
        status: u16,
        message: String,
        context: Option<ErrorContext>,
    },

    /// Request terminated via the cancellation handle.
    #[error("request cancelled")]
    Cancelled,

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn rate_limited(retry_after: Option<Duration>, context: ErrorContext) -> Self {
        Self::RateLimited {
            retry_after,
            context: Some(context),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn remote_api(status: u16, message: impl Into<String>, context: ErrorContext) -> Self {
        Self::RemoteApi {
            status,
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the gateway should retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Network(_) => true,
            Self::RemoteApi { status, .. } => *status >= 500,
            Self::Validation { .. } => false,
            Self::Cancelled => false,
            Self::Config(_) => false,
        }
    }

    /// Server-provided retry-after hint, when present.
    pub fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Network(_) => "network_error",
            Self::Validation { .. } => "validation_error",
            Self::RemoteApi { .. } => "remote_api_error",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::RateLimited { context, .. } => context.as_ref(),
            Self::RemoteApi { context, .. } => context.as_ref(),
            Self::Network(_) => None,
            Self::Validation { .. } => None,
            Self::Cancelled => None,
            Self::Config(_) => None,
        }
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}
