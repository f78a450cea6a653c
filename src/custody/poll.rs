//! Explicit polling of asynchronous custody activities

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::client::CustodyClient;
use super::errors::CustodyError;
use super::types::Activity;
use crate::utils::logging::LoggingHelper;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(30);

/// How often to re-check and when to give up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_POLL_DEADLINE,
        }
    }
}

impl PollPolicy {
    #[must_use]
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("gave up waiting after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("polling cancelled")]
    Cancelled,

    #[error(transparent)]
    Custody(#[from] CustodyError),
}

/// Run `check` every `policy.interval` until it yields a value
///
/// Errors from `check` end the loop immediately. Neither the deadline nor
/// cancellation ever produce a value.
///
/// # Errors
///
/// - `PollError::Timeout` once `policy.deadline` has passed
/// - `PollError::Cancelled` if `cancel` fires first
/// - `PollError::Custody` if a check fails
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, CustodyError>>,
{
    let interval = policy.interval;
    let work = async {
        loop {
            match check().await {
                Ok(Some(value)) => return Ok::<T, PollError>(value),
                Ok(None) => {}
                Err(err) => return Err(PollError::Custody(err)),
            }
            tokio::time::sleep(interval).await;
        }
    };

    within(policy, cancel, work).await
}

/// Run one custody call under the same deadline and cancellation as polling
///
/// # Errors
///
/// - `PollError::Timeout` if the call outlives `policy.deadline`
/// - `PollError::Cancelled` if `cancel` fires first
/// - `PollError::Custody` if the call fails
pub async fn bounded<T, Fut>(policy: &PollPolicy, cancel: &CancellationToken, call: Fut) -> Result<T, PollError>
where
    Fut: Future<Output = Result<T, CustodyError>>,
{
    within(policy, cancel, async { call.await.map_err(PollError::Custody) }).await
}

async fn within<T, Fut>(policy: &PollPolicy, cancel: &CancellationToken, work: Fut) -> Result<T, PollError>
where
    Fut: Future<Output = Result<T, PollError>>,
{
    let started = Instant::now();
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PollError::Cancelled),
        outcome = tokio::time::timeout(policy.deadline, work) => match outcome {
            Ok(result) => result,
            Err(_) => Err(PollError::Timeout { elapsed: started.elapsed() }),
        },
    }
}

/// Wait for an activity to reach a terminal status
///
/// An activity that is already terminal is returned as is, without a round
/// trip.
///
/// # Errors
///
/// See [`poll_until`]
pub async fn poll_activity(
    client: &dyn CustodyClient,
    activity: Activity,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<Activity, PollError> {
    if activity.status.is_terminal() {
        return Ok(activity);
    }

    let organization_id = activity.organization_id.as_str();
    let activity_id = activity.id.as_str();
    LoggingHelper::log_activity_pending(activity_id, &activity.activity_type);

    poll_until(policy, cancel, move || async move {
        let current = client.get_activity(organization_id, activity_id).await?;
        LoggingHelper::log_activity_status(activity_id, &current.status);
        Ok::<_, CustodyError>(current.status.is_terminal().then_some(current))
    })
    .await
}
