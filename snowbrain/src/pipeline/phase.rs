use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::error::Result;
use crate::pipeline::gate::ConcurrencyGate;
use crate::pipeline::progress::phase_bar;
use crate::pipeline::retry::{RetryPolicy, Timed};

/// One successful work item and what its call produced.
#[derive(Debug, Clone)]
pub struct Completed<I, T> {
    pub item: I,
    pub value: T,
    /// From gate admission to the final answer, backoff included.
    pub elapsed: Duration,
}

/// Counts and timings for one phase. Owned by the run, never global.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseStats {
    pub name: String,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub total_item_latency: Duration,
}

impl PhaseStats {
    pub fn average_latency(&self) -> Option<Duration> {
        if self.succeeded == 0 {
            return None;
        }
        Some(self.total_item_latency / self.succeeded as u32)
    }
}

#[derive(Debug)]
pub struct PhaseOutcome<I, T> {
    pub completed: Vec<Completed<I, T>>,
    pub stats: PhaseStats,
}

/// Fans a batch of work items out through a gate and a retry policy.
///
/// Each item holds one gate slot for the whole of its call, retries
/// included. A terminal failure is logged and counted; it never stops the
/// other items. The phase ends once every item has succeeded or given up.
pub struct PhaseRunner {
    name: &'static str,
    gate: ConcurrencyGate,
    policy: RetryPolicy,
    show_progress: bool,
}

impl PhaseRunner {
    pub fn new(name: &'static str, limit: usize, policy: RetryPolicy, show_progress: bool) -> Self {
        Self {
            name,
            gate: ConcurrencyGate::new(name, limit),
            policy,
            show_progress,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, call: F) -> PhaseOutcome<I, T>
    where
        I: Clone + Display,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let requested = items.len();
        let bar = phase_bar(self.name, requested, self.show_progress);
        tracing::info!(phase = self.name, items = requested, limit = self.gate.limit(), "Phase started");

        let call = &call;
        let bar = &bar;
        let outcomes = join_all(items.into_iter().map(|item| async move {
            let outcome = self.call_one(&item, call).await;
            if let Err(e) = &outcome {
                tracing::warn!(phase = self.name, item = %item, error = %e, "Item failed");
            }
            bar.inc(1);
            (item, outcome)
        }))
        .await;

        let mut completed = Vec::with_capacity(requested);
        let mut stats = PhaseStats {
            name: self.name.to_string(),
            requested,
            ..PhaseStats::default()
        };

        for (item, outcome) in outcomes {
            match outcome {
                Ok(Timed { value, elapsed }) => {
                    stats.succeeded += 1;
                    stats.total_item_latency += elapsed;
                    completed.push(Completed {
                        item,
                        value,
                        elapsed,
                    });
                }
                Err(_) => stats.failed += 1,
            }
        }

        stats.elapsed = started.elapsed();
        bar.finish_and_clear();
        tracing::info!(
            phase = self.name,
            succeeded = stats.succeeded,
            failed = stats.failed,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Phase finished"
        );

        PhaseOutcome { completed, stats }
    }

    async fn call_one<I, T, F, Fut>(&self, item: &I, call: &F) -> Result<Timed<T>>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.gate.acquire().await?;
        let outcome = self.policy.run(self.name, || call(item.clone())).await;
        permit.release();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrainError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn runner(limit: usize, attempts: u32) -> PhaseRunner {
        let policy = RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(2));
        PhaseRunner::new("test", limit, policy, false)
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let outcome = runner(2, 1)
            .run((1..=5u32).collect(), |n: u32| async move {
                if n % 2 == 0 {
                    Err(BrainError::MalformedOutput(format!("item {n}")))
                } else {
                    Ok(n * 10)
                }
            })
            .await;

        let mut values: Vec<u32> = outcome.completed.iter().map(|c| c.value).collect();
        values.sort();
        assert_eq!(values, vec![10, 30, 50]);
        assert_eq!(outcome.stats.requested, 5);
        assert_eq!(outcome.stats.succeeded, 3);
        assert_eq!(outcome.stats.failed, 2);
    }

    #[tokio::test]
    async fn test_concurrency_stays_under_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runner = runner(3, 1);

        let outcome = runner
            .run((0..12u32).collect(), |_: u32| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(outcome.stats.succeeded, 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(runner.gate().peak() <= 3);
    }

    #[tokio::test]
    async fn test_exhausted_item_counts_one_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = runner(1, 3)
            .run(vec![7u32], |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(BrainError::Transient("503".to_string()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.stats.failed, 1);
        assert!(outcome.completed.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcome = runner(4, 1)
            .run(Vec::<u32>::new(), |n| async move { Ok(n) })
            .await;
        assert_eq!(outcome.stats, PhaseStats {
            name: "test".to_string(),
            elapsed: outcome.stats.elapsed,
            ..PhaseStats::default()
        });
        assert_eq!(outcome.stats.average_latency(), None);
    }
}
