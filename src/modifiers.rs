use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use crate::{PipelineError, Task};

/// Turns a failure of the wrapped task into a completion, so dependents may
/// proceed. Cancellation is never absorbed.
pub struct Skippable<T> {
    inner: T,
}

impl<T: Task> Skippable<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Task> Task for Skippable<T> {
    async fn perform(&self, ctx: CancellationToken) -> Result<(), PipelineError> {
        match self.inner.perform(ctx).await {
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(error = %e, "Skipping task due to error: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    fn retry_handler(&self, error: &PipelineError) -> bool {
        self.inner.retry_handler(error)
    }
}

/// Fails with `ResourceUnavailable` when the predicate reports the resource
/// missing; the wrapped task is not called in that case.
pub struct ResourceGate<T, P> {
    inner: T,
    resource: String,
    is_available: P,
}

impl<T, P> ResourceGate<T, P>
where
    T: Task,
    P: Fn() -> bool + Send + Sync,
{
    pub fn new(inner: T, is_available: P) -> Self {
        Self::named(inner, "resource", is_available)
    }

    pub fn named(inner: T, resource: impl Into<String>, is_available: P) -> Self {
        Self {
            inner,
            resource: resource.into(),
            is_available,
        }
    }
}

#[async_trait]
impl<T, P> Task for ResourceGate<T, P>
where
    T: Task,
    P: Fn() -> bool + Send + Sync,
{
    async fn perform(&self, ctx: CancellationToken) -> Result<(), PipelineError> {
        if !(self.is_available)() {
            return Err(PipelineError::ResourceUnavailable {
                resource: self.resource.clone(),
            });
        }
        self.inner.perform(ctx).await
    }

    fn retry_handler(&self, error: &PipelineError) -> bool {
        self.inner.retry_handler(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use crate::TaskExt;

    #[derive(Clone, Default)]
    struct Probe {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl Task for Probe {
        async fn perform(&self, _ctx: CancellationToken) -> Result<(), PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PipelineError::failed("AlwaysFailsTask failed"))
            } else {
                Ok(())
            }
        }

        fn retry_handler(&self, _error: &PipelineError) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn skip_absorbs_failures() {
        let probe = Probe { fail: true, ..Default::default() };
        let calls = Arc::clone(&probe.calls);

        probe.skippable().perform(CancellationToken::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skip_does_not_absorb_cancellation() {
        struct Cancelled;

        #[async_trait]
        impl Task for Cancelled {
            async fn perform(&self, _ctx: CancellationToken) -> Result<(), PipelineError> {
                Err(PipelineError::ContextCancelled("stop".into()))
            }
        }

        let err = Cancelled.skippable().perform(CancellationToken::new()).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_wrapping_retry_exhausts_attempts_then_completes() {
        let probe = Probe { fail: true, ..Default::default() };
        let calls = Arc::clone(&probe.calls);

        probe.retries(3).skippable().perform(CancellationToken::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn closed_gate_never_calls_the_task() {
        let probe = Probe::default();
        let calls = Arc::clone(&probe.calls);

        let err = probe
            .check_resource_named("tenant-db", || false)
            .perform(CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::ResourceUnavailable { ref resource } if resource == "tenant-db"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_around_gate_polls_until_available() {
        let probe = Probe::default();
        let calls = Arc::clone(&probe.calls);
        let polls = Arc::new(AtomicU32::new(0));
        let ready = Arc::new(AtomicBool::new(false));

        let gate = {
            let polls = Arc::clone(&polls);
            let ready = Arc::clone(&ready);
            move || {
                // 第三次检查时资源就绪
                if polls.fetch_add(1, Ordering::SeqCst) == 2 {
                    ready.store(true, Ordering::SeqCst);
                }
                ready.load(Ordering::SeqCst)
            }
        };

        probe.check_resource(gate).retries(5).perform(CancellationToken::new()).await.unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
