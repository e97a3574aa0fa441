use rand::random_range;
use std::future::Future;
use tokio::time::{Duration, Instant, sleep};

use crate::api_error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Retry,
    GiveUp,
}

/// Exponential backoff with jitter, bounded by a total time budget.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub budget: Duration,
    pub base: Duration,
    pub max: Duration,
    pub jitter_frac: f32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(60),
            base: Duration::from_millis(250),
            max: Duration::from_secs(5),
            jitter_frac: 0.5,
        }
    }
}

impl Backoff {
    fn jittered(&self, d: Duration) -> Duration {
        let ms = d.as_millis() as i64;
        let delta = (ms as f32 * self.jitter_frac) as i64;
        let j = if delta > 0 {
            random_range(-delta..=delta)
        } else {
            0
        };
        Duration::from_millis((ms + j).max(0) as u64)
    }
}

/// Runs `op` until it succeeds, `classify` says to give up, or the budget is spent.
/// The last error is returned in the two failure cases.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    backoff: &Backoff,
    mut op: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Attempt,
{
    let deadline = Instant::now() + backoff.budget;
    let mut delay = backoff.base;

    loop {
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if classify(&err) == Attempt::GiveUp {
            return Err(err);
        }

        let pause = backoff.jittered(delay.min(backoff.max));
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || pause > remaining {
            return Err(err);
        }
        sleep(pause).await;
        delay = (delay * 2).min(backoff.max);
    }
}

/// Transport failures and 5xx/429 answers are worth another attempt; anything
/// the peer rejected on its merits is not.
pub fn classify_upstream(err: &ApiError) -> Attempt {
    match err {
        ApiError::UpstreamReq(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
            Attempt::Retry
        }
        ApiError::UpstreamStatus(st)
            if st.is_server_error() || *st == reqwest::StatusCode::TOO_MANY_REQUESTS =>
        {
            Attempt::Retry
        }
        _ => Attempt::GiveUp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> Backoff {
        Backoff {
            budget: Duration::from_secs(2),
            base: Duration::from_millis(1),
            max: Duration::from_millis(5),
            jitter_frac: 0.0,
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let res: Result<usize, ApiError> = retry_with_backoff(
            &fast(),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ApiError::UpstreamStatus(reqwest::StatusCode::BAD_GATEWAY))
                } else {
                    Ok(n)
                }
            },
            classify_upstream,
        )
        .await;

        assert_eq!(res.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_on_client_errors() {
        let calls = AtomicUsize::new(0);
        let res: Result<(), ApiError> = retry_with_backoff(
            &fast(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::UpstreamStatus(reqwest::StatusCode::CONFLICT))
            },
            classify_upstream,
        )
        .await;

        assert!(matches!(res, Err(ApiError::UpstreamStatus(st)) if st == reqwest::StatusCode::CONFLICT));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
