// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry an idempotent async operation with linear backoff: attempt N
/// sleeps N seconds before the next try. Surfaces the last error.
pub async fn with_retry<F, Fut, T, E>(mut op: F, max_retries: usize) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(_) if attempt < max_retries => {
                sleep(Duration::from_millis(1_000 * attempt as u64)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let counter = AtomicUsize::new(0);
        let res: Result<u32, ()> = with_retry(
            |_| {
                let current = counter.fetch_add(1, Ordering::Relaxed);
                async move { if current < 2 { Err(()) } else { Ok(7) } }
            },
            4,
        )
        .await;

        assert_eq!(res.unwrap(), 7);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_last_error_after_exhaustion() {
        let counter = AtomicUsize::new(0);
        let res: Result<(), usize> = with_retry(
            |attempt| {
                counter.fetch_add(1, Ordering::Relaxed);
                async move { Err(attempt) }
            },
            3,
        )
        .await;

        assert_eq!(res.unwrap_err(), 3);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }
}
