use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

/// Outcome of a settle-all fan-out, split by result and keyed by input.
#[derive(Debug)]
pub struct Settled<K, T, E> {
    pub succeeded: Vec<(K, T)>,
    pub failed: Vec<(K, E)>,
}

/// Drives every future to completion, whatever the others return, and only
/// then classifies the outcomes.
pub async fn settle_all<K, F, T, E>(tasks: impl IntoIterator<Item = (K, F)>) -> Settled<K, T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let results = join_all(
        tasks
            .into_iter()
            .map(|(key, task)| async move { (key, task.await) }),
    )
    .await;

    let mut settled = Settled {
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for (key, result) in results {
        match result {
            Ok(value) => settled.succeeded.push((key, value)),
            Err(err) => settled.failed.push((key, err)),
        }
    }
    settled
}

/// Fixed attempt count and fixed delay between attempts, no backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 10,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    warn!(attempt, attempts, error = %err, "Attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
