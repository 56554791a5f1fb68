//! Keep-alive ping for the admin session
//!
//! The backend enforces the real session timeout. The ping is a best-effort hint
//! that the session is still in use, so its outcome never blocks the client.

use std::future::Future;

use tracing::{info, warn};

use crate::api::ApiClient;
use crate::event::KeepAliveOutcome;

/// Issues one keep-alive request. No retry, no backoff, no timeout.
pub trait KeepAlive: Send + Sync + 'static {
    fn ping(&self) -> impl Future<Output = KeepAliveOutcome> + Send;
}

impl KeepAlive for ApiClient {
    async fn ping(&self) -> KeepAliveOutcome {
        match ApiClient::ping(self).await {
            Ok(()) => {
                info!("keep-alive acknowledged");
                KeepAliveOutcome::Success
            }
            Err(e) => {
                warn!("keep-alive failed: {}", e);
                KeepAliveOutcome::Failure(e.to_string())
            }
        }
    }
}
