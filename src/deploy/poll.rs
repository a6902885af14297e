// ABOUTME: Bounded poll-with-timeout for eventually consistent fleet state.
// ABOUTME: Waits are cancellable through a watch channel so rollback can interrupt them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// One probe result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<T> {
    Done(T),
    /// Not there yet; the message is reported if the wait times out.
    Waiting(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    TimedOut { last: String },
    Cancelled,
    Failed(E),
}

/// Broadcasts cancellation to every wait subscribed before the cancel.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Token for one wait. Only cancels issued after this call are seen.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn cancel(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }
}

/// Run `probe` every `interval` until it reports done, `timeout` elapses,
/// or `cancel` fires. The probe always runs at least once.
pub async fn poll_until<T, E, F, Fut>(
    interval: Duration,
    timeout: Duration,
    cancel: &mut watch::Receiver<u64>,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Progress<T>, E>>,
{
    let deadline = Instant::now() + timeout;
    let mut cancel_live = true;

    loop {
        let last = match probe().await.map_err(PollError::Failed)? {
            Progress::Done(value) => return Ok(value),
            Progress::Waiting(message) => message,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::TimedOut { last });
        }
        let nap = interval.min(deadline - now);

        if cancel_live {
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                changed = cancel.changed() => match changed {
                    Ok(()) => return Err(PollError::Cancelled),
                    // Signal dropped: nobody can cancel any more.
                    Err(_) => {
                        cancel_live = false;
                        tokio::time::sleep_until(now + nap).await;
                    }
                },
            }
        } else {
            tokio::time::sleep(nap).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn returns_once_probe_is_done() {
        let signal = CancellationSignal::new();
        let mut cancel = signal.subscribe();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<u32, PollError<()>> = poll_until(
            Duration::from_secs(10),
            Duration::from_secs(60),
            &mut cancel,
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(if n == 3 {
                    Progress::Done(n)
                } else {
                    Progress::Waiting(format!("attempt {n}"))
                })
            },
        )
        .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_last_message() {
        let signal = CancellationSignal::new();
        let mut cancel = signal.subscribe();
        let started = Instant::now();

        let result: Result<(), PollError<()>> = poll_until(
            Duration::from_secs(10),
            Duration::from_secs(35),
            &mut cancel,
            || async { Ok(Progress::Waiting("still pending".into())) },
        )
        .await;

        assert_eq!(
            result,
            Err(PollError::TimedOut {
                last: "still pending".into()
            })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_the_wait() {
        let signal = CancellationSignal::new();
        let mut cancel = signal.subscribe();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            trigger.cancel();
        });

        let result: Result<(), PollError<()>> = poll_until(
            Duration::from_secs(10),
            Duration::from_secs(600),
            &mut cancel,
            || async { Ok(Progress::Waiting("waiting".into())) },
        )
        .await;

        assert_eq!(result, Err(PollError::Cancelled));
    }
}
