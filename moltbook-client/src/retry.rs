use std::{fmt::Display, future::Future, time::Duration};

/// Wait between a failed attempt and the next one
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Backoff {
    None,
    Constant(Duration),

    /// Wait `step` after the first failure, `2 * step` after the second, etc.
    Linear(Duration),
}

impl Backoff {
    /// `failed` is the 1-based number of the attempt that just failed
    pub fn delay_after(&self, failed: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Constant(d) => *d,
            Backoff::Linear(step) => step.saturating_mul(failed),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included. Zero behaves as one.
    pub max_attempts: u32,
    pub backoff: Backoff,

    /// Each attempt is abandoned after this long
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Backoff::Linear(Duration::from_secs(1)),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("request attempt timed out after {0:?}")]
pub struct TimedOut(pub Duration);

impl RetryPolicy {
    pub fn single_attempt(attempt_timeout: Duration) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            backoff: Backoff::None,
            attempt_timeout,
        }
    }

    /// Run `attempt` until it succeeds, fails with an error `should_retry`
    /// rejects, or the attempts run out. The last error is returned.
    ///
    /// `attempt` receives the 1-based attempt number. An attempt that outlives
    /// `attempt_timeout` is dropped, which cancels whatever it was awaiting.
    pub async fn run<F, Fut, R, E>(
        &self,
        mut attempt: F,
        should_retry: impl Fn(&E) -> bool,
    ) -> Result<R, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TimedOut> + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut n = 1;
        loop {
            let err = match tokio::time::timeout(self.attempt_timeout, attempt(n)).await {
                Ok(Ok(res)) => return Ok(res),
                Ok(Err(e)) => e,
                Err(_) => E::from(TimedOut(self.attempt_timeout)),
            };
            if n >= max_attempts || !should_retry(&err) {
                return Err(err);
            }
            let delay = self.backoff.delay_after(n);
            tracing::warn!(attempt = n, max_attempts, ?delay, "request failed, will retry: {err}");
            tokio::time::sleep(delay).await;
            n += 1;
        }
    }
}
