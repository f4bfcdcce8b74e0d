use crate::{Error, Result};
use reqwest::IntoUrl;
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::trace;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug, Default)]
pub struct Opts {
    /// Zero means no timeout
    pub request_timeout: Duration,
}

impl Opts {
    fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::ClientBuilder::new().user_agent(APP_USER_AGENT);
        if !self.request_timeout.is_zero() {
            builder = builder.timeout(self.request_timeout);
        }
        builder.build()
    }
}

#[derive(Clone, Debug)]
pub struct Client {
    client: reqwest::Client,
}

// Google APIs wrap failures as {"error": {"code": 403, "message": "..."}}
#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// The message from an API error body, or the body itself if it is something else
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

impl Client {
    pub fn build(opts: Opts) -> Result<Self> {
        Ok(Self {
            client: opts.build_client()?,
        })
    }

    /// GET url and decode the JSON response. Any non-success status is turned into
    /// Error::Source, with the message from the response body.
    pub async fn get_json<T: DeserializeOwned, U: IntoUrl>(&self, url: U) -> Result<T> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        trace!(%status, "Got response");
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(Error::Source {
                status,
                message: api_error_message(&body),
            });
        }
        Ok(res.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let body = r#"{"error": {"code": 403, "message": "The request cannot be completed because you have exceeded your quota.", "errors": []}}"#;
        assert_eq!(
            "The request cannot be completed because you have exceeded your quota.",
            api_error_message(body)
        );
        assert_eq!("Bad Gateway", api_error_message("Bad Gateway\n"));
        assert_eq!("", api_error_message(""));
    }

    #[test]
    fn builds_with_and_without_timeout() {
        assert!(Client::build(Opts::default()).is_ok());
        assert!(
            Client::build(Opts {
                request_timeout: Duration::from_secs(5)
            })
            .is_ok()
        );
    }
}
