//! Endpoint reachability check.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::{ControlError, ControlResult};

/// Check that something answers at `url`.
///
/// Any HTTP response counts as reachable, whatever its status. A connect
/// failure or timeout is [`ControlError::Unreachable`]; other transport
/// errors are [`ControlError::ObjectStorage`].
pub async fn probe_endpoint(url: &str, timeout: Duration) -> ControlResult<()> {
    let client = Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| ControlError::object_storage(format!("failed to build HTTP client: {e}")))?;

    match client.head(url).send().await {
        Ok(response) => {
            debug!(endpoint = url, status = %response.status(), "endpoint reachable");
            Ok(())
        }
        Err(e) if e.is_connect() || e.is_timeout() => Err(ControlError::Unreachable {
            endpoint: url.to_owned(),
            message: e.to_string(),
        }),
        Err(e) => Err(ControlError::object_storage(format!("failed to reach {url}: {e}"))),
    }
}
