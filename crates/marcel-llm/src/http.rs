//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

use crate::error::LlmError;

/// Build the HTTP client used by the OpenAI-compatible provider.
///
/// `request_timeout` bounds the whole request including a streamed body, so it is the
/// only deadline a generation stream gets. `None` leaves streams unbounded.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client(
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
) -> Result<reqwest::Client, LlmError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("marcel/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10));
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_and_without_request_timeout() {
        assert!(build_client(Duration::from_secs(5), Some(Duration::from_secs(30))).is_ok());
        assert!(build_client(Duration::from_secs(5), None).is_ok());
    }
}
