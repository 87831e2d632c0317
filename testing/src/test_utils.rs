use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

const RETRIES: usize = 50;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Polls `check` until it yields `expected` or the retry budget runs out.
pub async fn assert_with_retries<F, Fut, T>(check: F, expected: T)
where
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
    T: PartialEq + Debug,
{
    let mut last = check().await;
    for _ in 0..RETRIES {
        if last == expected {
            return;
        }
        tokio::time::sleep(RETRY_DELAY).await;
        last = check().await;
    }
    panic!("expected {expected:?}, still seeing {last:?} after {RETRIES} retries");
}
