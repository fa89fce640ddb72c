use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Map a low-level fetch error onto the message shown to users.
///
/// Matching is keyword-based on the error text because the interesting
/// causes (DNS, refused, reset, TLS) surface as opaque strings from the
/// HTTP client.
pub fn friendly_error_message(error: &CrawlError) -> String {
    match error {
        CrawlError::Timeout(_) => {
            return "Timeout: Server hat nicht rechtzeitig geantwortet".to_string()
        }
        CrawlError::TooManyRedirects => {
            return "Zu viele Weiterleitungen (Redirect-Schleife?)".to_string()
        }
        _ => {}
    }

    let msg = error.to_string();
    let lower = msg.to_lowercase();

    if lower.contains("getaddrinfo")
        || lower.contains("name or service not known")
        || lower.contains("failed to lookup address")
        || lower.contains("dns error")
    {
        return "DNS-Fehler: Domain konnte nicht aufgeloest werden (Tippfehler in der URL?)"
            .to_string();
    }
    if lower.contains("no address associated") {
        return "DNS-Fehler: Keine IP-Adresse fuer diese Domain gefunden".to_string();
    }
    if lower.contains("connection refused") {
        return "Verbindung abgelehnt: Server antwortet nicht auf diesem Port".to_string();
    }
    if lower.contains("connection reset") {
        return "Verbindung vom Server zurueckgesetzt".to_string();
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return "Timeout: Server hat nicht rechtzeitig geantwortet".to_string();
    }
    if lower.contains("ssl") || lower.contains("certificate") || lower.contains("tls") {
        return format!("SSL/TLS-Fehler: {msg}");
    }
    if lower.contains("too many redirects") {
        return "Zu viele Weiterleitungen (Redirect-Schleife?)".to_string();
    }

    msg
}
