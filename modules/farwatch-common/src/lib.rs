pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::FarwatchError;
pub use types::*;

/// Extract the host portion of a URL, dropping any leading `www.`.
/// Falls back to the input (trimmed of scheme) when it does not parse.
pub fn extract_host(raw: &str) -> String {
    if let Ok(parsed) = url::Url::parse(raw) {
        if let Some(host) = parsed.host_str() {
            return host.trim_start_matches("www.").to_string();
        }
    }
    raw.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .split('/')
        .next()
        .unwrap_or(raw)
        .to_string()
}
