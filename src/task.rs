use std::sync::Arc;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use crate::{BoxTask, PipelineError, ResourceGate, Retry, RetryPolicy, Skippable};

#[async_trait]
pub trait Task: Send + Sync {
    async fn perform(&self, ctx: CancellationToken) -> Result<(), PipelineError>;

    // 默认不重试
    fn retry_handler(&self, _error: &PipelineError) -> bool {
        false
    }
}

#[async_trait]
impl<T: Task + ?Sized> Task for Arc<T> {
    async fn perform(&self, ctx: CancellationToken) -> Result<(), PipelineError> {
        (**self).perform(ctx).await
    }

    fn retry_handler(&self, error: &PipelineError) -> bool {
        (**self).retry_handler(error)
    }
}

/// Composition helpers for the behavior modifiers.
///
/// Modifiers nest outward in call order, so `task.retries(3).skippable()`
/// retries first and then gives up quietly.
pub trait TaskExt: Task + Sized + 'static {
    fn retries(self, max_attempts: u32) -> Retry<Self> {
        Retry::new(self, RetryPolicy::fixed(max_attempts))
    }

    fn retry_with(self, policy: RetryPolicy) -> Retry<Self> {
        Retry::new(self, policy)
    }

    fn skippable(self) -> Skippable<Self> {
        Skippable::new(self)
    }

    fn check_resource<P>(self, is_available: P) -> ResourceGate<Self, P>
    where
        P: Fn() -> bool + Send + Sync,
    {
        ResourceGate::new(self, is_available)
    }

    fn check_resource_named<P>(self, resource: impl Into<String>, is_available: P) -> ResourceGate<Self, P>
    where
        P: Fn() -> bool + Send + Sync,
    {
        ResourceGate::named(self, resource, is_available)
    }

    fn boxed(self) -> BoxTask {
        Arc::new(self)
    }
}

impl<T: Task + Sized + 'static> TaskExt for T {}
