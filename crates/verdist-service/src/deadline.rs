use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ServiceError, ServiceResult};

/// Await a store or index call, failing with [`ServiceError::Timeout`] once
/// `budget` has elapsed.
pub(crate) async fn bounded<T, E>(
    operation: &'static str,
    budget: Duration,
    call: impl Future<Output = Result<T, E>>,
) -> ServiceResult<T>
where
    E: Into<ServiceError>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            warn!(operation, ?budget, "dependency call timed out");
            Err(ServiceError::Timeout { operation, budget })
        }
    }
}
