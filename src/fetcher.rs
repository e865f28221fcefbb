//! Concurrent telemetry acquisition.
//!
//! One request per sensor address, all in flight at once and joined
//! all-settled: a failing or slow sensor never aborts the others.

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::client::BackendClient;
use crate::models::RawTelemetrySample;

// ---

/// A sensor that answered this cycle. `sample` is `None` for an empty body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTelemetry {
    pub address: String,
    pub sample: Option<RawTelemetrySample>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchBatch {
    // ---
    /// Successful fetches, in arrival order.
    pub fetched: Vec<FetchedTelemetry>,

    /// Addresses whose fetch failed; their previous records stay as they are.
    pub failed: Vec<String>,
}

/// Fetch telemetry for every address concurrently.
///
/// The per-request timeout is enforced by the client, so the batch finishes
/// within roughly one timeout per configured endpoint.
pub async fn fetch_all(
    client: &BackendClient,
    addresses: &[String],
    window_secs: u32,
) -> FetchBatch {
    // ---
    let mut tasks = JoinSet::new();
    for address in addresses {
        let client = client.clone();
        let address = address.clone();
        tasks.spawn(async move {
            let result = client.get_telemetry(&address, window_secs).await;
            (address, result)
        });
    }

    let mut batch = FetchBatch::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((address, Ok(sample))) => {
                debug!(%address, has_data = sample.is_some(), "telemetry fetched");
                batch.fetched.push(FetchedTelemetry { address, sample });
            }
            Ok((address, Err(e))) => {
                warn!(%address, "telemetry fetch failed: {}", e);
                batch.failed.push(address);
            }
            Err(e) => {
                warn!("telemetry task aborted: {}", e);
            }
        }
    }

    if !batch.failed.is_empty() {
        warn!(
            "{} of {} sensors failed this cycle: {:?}",
            batch.failed.len(),
            addresses.len(),
            batch.failed
        );
    }
    batch
}
