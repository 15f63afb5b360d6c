use crate::config::Configuration;
use reqwest::{Client, redirect};
use std::time::Duration;

/// Time allowed for establishing the connection itself.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Redirects followed before a request fails.
pub const MAX_REDIRECTS: usize = 3;

/// Builds the client shared by every request of a batch.
///
/// The configured timeout bounds the whole exchange, body included, so a
/// stalled server cannot hold a request open past its deadline.
pub fn build_client(config: &Configuration) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(config.timeout)
        .redirect(redirect_policy())
        .danger_accept_invalid_certs(config.insecure_skip_verify)
        .build()
}

fn redirect_policy() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        // `previous` holds the original URL plus every redirect already followed.
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error(format!("stopped after {MAX_REDIRECTS} redirects"))
        } else {
            attempt.follow()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_and_without_verification() {
        let mut config = Configuration {
            timeout: Duration::from_millis(250),
            ..Default::default()
        };
        assert!(build_client(&config).is_ok());

        config.insecure_skip_verify = true;
        assert!(build_client(&config).is_ok());
    }
}
