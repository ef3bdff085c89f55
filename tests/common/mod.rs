#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dagpipe::{ConfigMap, Context, PipelineError, PlanReporter, Registry, Task};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Journal {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event} not recorded"))
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn started(&self, name: &str) -> bool {
        self.events().iter().any(|e| e == &format!("start:{name}"))
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn step(&self, name: &str) -> Step {
        Step {
            name: name.to_string(),
            journal: self.clone(),
            delay: Duration::ZERO,
            failures: u32::MAX,
            fail: false,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

/// Task double: optional delay, optional failures for its first N calls.
pub struct Step {
    name: String,
    journal: Journal,
    delay: Duration,
    failures: u32,
    fail: bool,
    calls: Arc<AtomicU32>,
}

impl Step {
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn always_fail(mut self) -> Self {
        self.fail = true;
        self.failures = u32::MAX;
        self
    }

    pub fn fail_times(mut self, failures: u32) -> Self {
        self.fail = true;
        self.failures = failures;
        self
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Task for Step {
    async fn perform(&self, _ctx: CancellationToken) -> Result<(), PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.journal.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.peak.fetch_max(running, Ordering::SeqCst);
        self.journal.push(format!("start:{}", self.name));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.journal.running.fetch_sub(1, Ordering::SeqCst);
        if self.fail && call <= self.failures {
            self.journal.push(format!("fail:{}", self.name));
            return Err(PipelineError::failed(format!("{} failed on call {}", self.name, call)));
        }
        self.journal.push(format!("end:{}", self.name));
        Ok(())
    }

    fn retry_handler(&self, _error: &PipelineError) -> bool {
        true
    }
}

#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub label: &'static str,
    pub seen: Arc<Mutex<Vec<(&'static str, Vec<String>)>>>,
}

impl PlanReporter for RecordingReporter {
    fn report(&self, plan: &[String]) {
        self.seen.lock().unwrap().push((self.label, plan.to_vec()));
    }
}

pub fn empty_registry() -> Registry {
    Registry::new(Context::shared(ConfigMap::new()))
}
