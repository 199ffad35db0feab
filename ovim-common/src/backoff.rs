use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MAX_WAIT_ITERATIONS: usize = 50;

/// Exponential backoff w/ "full jitter": sleep for a random duration in
/// `[0, min(cap, base * 2^attempt)]`. Used where any amount of spread is fine,
/// e.g. reconciler requeue jitter.
pub fn backoff_full_jitter(base: Duration, cap: Duration, attempt: usize) -> Duration {
    let upper = exp_capped_ms(base, cap, attempt);
    let jitter_ms = rand::random_range(0..=upper);
    Duration::from_millis(jitter_ms)
}

/// Exponential backoff with the delay jittered by +/-10% of its computed value,
/// rather than drawn uniformly from the whole range. Used for the hub retry
/// policy, where attempts should stay clustered around the intended cadence
/// instead of spreading across the full exponential range.
pub fn backoff_bounded_jitter(base: Duration, cap: Duration, attempt: usize) -> Duration {
    let exp_ms = exp_capped_ms(base, cap, attempt).max(1);
    let spread = (exp_ms / 10).max(1);
    let low = exp_ms.saturating_sub(spread);
    let high = exp_ms.saturating_add(spread);
    let jitter_ms = rand::random_range(low..=high);
    Duration::from_millis(jitter_ms)
}

fn exp_capped_ms(base: Duration, cap: Duration, attempt: usize) -> u64 {
    let base_ms = base.as_millis() as u64;
    let cap_ms = cap.as_millis() as u64;
    let pow = if attempt >= 63 {
        u64::MAX
    } else {
        1u64 << attempt
    };
    let exp_ms = base_ms.saturating_mul(pow);
    exp_ms.min(cap_ms).max(1)
}

/// Waits `n` iterations of full-jitter backoff, bailing out early on cancellation.
pub async fn wait_with_backoff(
    cancel: &CancellationToken,
    n: usize,
    base: Duration,
    cap: Duration,
) -> anyhow::Result<()> {
    let n = n.clamp(1, MAX_WAIT_ITERATIONS);
    for attempt in 0..n {
        let delay = backoff_full_jitter(base, cap, attempt);
        tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("context cancelled"),
            _ = tokio::time::sleep(delay) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_jitter_stays_within_ten_percent_of_the_exponential_value() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(60);
        for attempt in 0..8 {
            let exp_ms = exp_capped_ms(base, cap, attempt);
            for _ in 0..50 {
                let delay = backoff_bounded_jitter(base, cap, attempt).as_millis() as u64;
                let spread = (exp_ms / 10).max(1);
                assert!(delay >= exp_ms.saturating_sub(spread));
                assert!(delay <= exp_ms.saturating_add(spread));
            }
        }
    }

    #[test]
    fn exponential_delay_is_capped() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(60);
        assert_eq!(exp_capped_ms(base, cap, 0), 1000);
        assert_eq!(exp_capped_ms(base, cap, 1), 2000);
        assert_eq!(exp_capped_ms(base, cap, 2), 4000);
        assert_eq!(exp_capped_ms(base, cap, 10), 60_000);
    }

    #[test]
    fn full_jitter_never_exceeds_the_cap() {
        let base = Duration::from_millis(250);
        let cap = Duration::from_secs(10);
        for attempt in 0..20 {
            let delay = backoff_full_jitter(base, cap, attempt);
            assert!(delay <= cap);
        }
    }
}
