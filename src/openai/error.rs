//! Tipos de erro para o cliente da Video API.
//!
//! Define [`ApiError`] com variantes para rate limiting, timeouts, resets de
//! conexão e erros HTTP. Cada variante carrega uma classificação explícita
//! ([`ErrorClass`]) usada pela política de retentativa; a varredura textual da
//! mensagem existe apenas como fallback para erros sem tipo estruturado.

use std::error::Error as _;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Whether retrying a failed call can be expected to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limiting, timeouts, connection resets.
    Transient,
    /// Anything retrying will not fix (invalid request, auth, 5xx bodies we can't interpret).
    Fatal,
}

/// Erros que podem ocorrer ao interagir com a Video API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// O servidor retornou HTTP 429.
    /// `retry_after` vem dos headers `retry-after-ms`/`retry-after` quando presentes.
    #[error("rate limited (status 429): {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// A requisição expirou (timeout local, HTTP 408 ou 504).
    #[error("request timed out: {0}")]
    Timeout(String),

    /// A conexão foi resetada pelo peer.
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// Qualquer outra resposta HTTP fora da faixa 2xx.
    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// Falha na camada de rede sem classificação mais específica.
    #[error("network error: {0}")]
    Network(reqwest::Error),

    /// O corpo da resposta não pôde ser interpretado.
    #[error("failed to decode API response: {0}")]
    Decode(String),

    /// O arquivo de referência não pôde ser lido para o upload multipart.
    #[error("failed to read input reference {}: {source}", .path.display())]
    InputReference {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Falha ao gravar o conteúdo baixado no destino local.
    #[error("failed to write downloaded content: {0}")]
    Sink(#[from] std::io::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let text = chain_text(&err);
        if err.is_timeout() {
            ApiError::Timeout(text)
        } else if text.to_ascii_lowercase().contains("connection reset") {
            ApiError::ConnectionReset(text)
        } else if err.is_decode() {
            ApiError::Decode(text)
        } else {
            ApiError::Network(err)
        }
    }
}

impl ApiError {
    /// Transient vs. fatal. Typed variants decide directly; `Status` and
    /// `Network` fall back to scanning the message for rate-limit/timeout markers.
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::RateLimited { .. } | ApiError::Timeout(_) | ApiError::ConnectionReset(_) => {
                ErrorClass::Transient
            }
            ApiError::Status {
                status: 408 | 429 | 504,
                ..
            } => ErrorClass::Transient,
            ApiError::Status { message, .. } => classify_message(message),
            ApiError::Network(err) => classify_message(&chain_text(err)),
            ApiError::Decode(_) | ApiError::InputReference { .. } | ApiError::Sink(_) => {
                ErrorClass::Fatal
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Server-supplied delay hint. The header value wins; otherwise the
    /// message is scanned for a `retry after N` phrase.
    pub fn retry_after(&self) -> Option<Duration> {
        if let ApiError::RateLimited {
            retry_after: Some(delay),
            ..
        } = self
        {
            return Some(*delay);
        }
        retry_after_from_message(&self.to_string())
    }

    /// Short machine-readable tag written into persisted error documents.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Timeout(_) => "timeout",
            ApiError::ConnectionReset(_) => "connection_reset",
            ApiError::Status { .. } => "api_status",
            ApiError::Network(_) => "network",
            ApiError::Decode(_) => "decode",
            ApiError::InputReference { .. } => "input_reference",
            ApiError::Sink(_) => "io",
        }
    }
}

fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    let markers = [
        "429",
        "rate limit",
        "too many requests",
        "timeout",
        "timed out",
        "connection reset",
    ];
    if markers.iter().any(|m| lower.contains(m)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

// reqwest's Display omits the source chain, which is where hyper reports resets.
fn chain_text(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

/// Parses a delay out of header values such as `"2"` or `"1.5"` (seconds).
/// Negative, non-finite and out-of-range values yield `None`.
pub(crate) fn parse_delay_secs(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Same as [`parse_delay_secs`] for millisecond values (`retry-after-ms`).
pub(crate) fn parse_delay_ms(value: &str) -> Option<Duration> {
    let ms = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}

/// Scans free text for `retry after: 3`, `retry-after=1.5`, `Retry After 20`.
pub(crate) fn retry_after_from_message(message: &str) -> Option<Duration> {
    let lower = message.to_ascii_lowercase();
    for marker in ["retry after", "retry-after"] {
        let mut from = 0;
        while let Some(pos) = lower[from..].find(marker) {
            let rest = &lower[from + pos + marker.len()..];
            let value = rest.trim_start_matches([':', '=', ' ']);
            if value.len() < rest.len() {
                let end = value
                    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                    .unwrap_or(value.len());
                let number = value[..end].trim_end_matches('.');
                if let Some(delay) = parse_delay_secs(number) {
                    return Some(delay);
                }
            }
            from += pos + marker.len();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
            message: "slow down".into(),
        };
        assert_eq!(err.to_string(), "rate limited (status 429): slow down");
    }

    #[test]
    fn typed_variants_classify_without_message() {
        let rate = ApiError::RateLimited {
            retry_after: None,
            message: String::new(),
        };
        assert_eq!(rate.class(), ErrorClass::Transient);
        assert_eq!(ApiError::Timeout("x".into()).class(), ErrorClass::Transient);
        assert_eq!(
            ApiError::ConnectionReset("x".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(ApiError::Decode("bad".into()).class(), ErrorClass::Fatal);
    }

    #[test]
    fn status_errors_fall_back_to_message_markers() {
        let invalid = ApiError::Status {
            status: 400,
            message: "size must be one of 1280x720".into(),
        };
        assert_eq!(invalid.class(), ErrorClass::Fatal);

        let gateway = ApiError::Status {
            status: 502,
            message: "upstream connection reset by peer".into(),
        };
        assert_eq!(gateway.class(), ErrorClass::Transient);

        let gateway_timeout = ApiError::Status {
            status: 504,
            message: String::new(),
        };
        assert!(gateway_timeout.is_transient());
    }

    #[test]
    fn retry_after_prefers_structured_hint() {
        let err = ApiError::RateLimited {
            retry_after: Some(Duration::from_millis(1500)),
            message: "retry after 30".into(),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn retry_after_scans_message() {
        assert_eq!(
            retry_after_from_message("Rate limit hit. Retry-After: 7"),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            retry_after_from_message("please retry after 2.5s"),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(
            retry_after_from_message("retry-after=12."),
            Some(Duration::from_secs(12))
        );
        assert_eq!(retry_after_from_message("retry later"), None);
        assert_eq!(retry_after_from_message("retryafter 3"), None);
    }

    #[test]
    fn negative_or_garbage_delays_are_ignored() {
        assert_eq!(parse_delay_secs("-1"), None);
        assert_eq!(parse_delay_secs("soon"), None);
        assert_eq!(parse_delay_secs(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(parse_delay_secs("NaN"), None);
    }

    #[test]
    fn huge_delays_are_ignored_instead_of_panicking() {
        assert_eq!(parse_delay_secs("20000000000000000000"), None);
        assert_eq!(parse_delay_secs("1e300"), None);
        assert_eq!(parse_delay_ms("1e300"), None);
        assert_eq!(parse_delay_ms("250"), Some(Duration::from_millis(250)));
        assert_eq!(retry_after_from_message("retry after 99999999999999999999999"), None);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ApiError>();
    }
}
