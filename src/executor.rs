use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use std::panic::AssertUnwindSafe;
use futures::FutureExt;
use indexmap::IndexSet;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use crate::{build_order, BoxTask, PipelineError, PlanReporter, Registry, SharedContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Concurrent { max_workers: usize },
}

impl ExecutionMode {
    /// Concurrent mode sized to the host's available parallelism.
    pub fn concurrent() -> Self {
        let max_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::Concurrent { max_workers }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::concurrent()
    }
}

/// What happens to the rest of the pipeline once a task fails without a
/// skip modifier. Dependents of the failed task never run under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Independent branches keep running.
    #[default]
    ContinueIndependent,
    /// Nothing new is dispatched; in-flight tasks are drained.
    Abort,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Completion order.
    pub completed: Vec<String>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn completed_set(&self) -> HashSet<&str> {
        self.completed.iter().map(String::as_str).collect()
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.completed.iter().any(|n| n == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Cancelled,
    DeadlineExceeded,
    Aborted,
}

/// Completion bookkeeping owned by a single `run()`. Workers of an earlier,
/// dropped run can only ever touch their own copy.
#[derive(Default)]
struct RunState {
    completed: Mutex<HashSet<String>>,
    log: Mutex<Vec<String>>,
}

impl RunState {
    async fn mark_completed(&self, name: &str) {
        // 完成状态在释放工作者之前写入
        self.completed.lock().await.insert(name.to_string());
        self.log.lock().await.push(name.to_string());
    }
}

struct Outcome {
    failures: Vec<(String, String)>,
    stop: Option<Stop>,
}

pub struct PipelineExecutor {
    registry: Registry,
    order: Vec<String>,
    dependents: HashMap<String, Vec<String>>,
    mode: ExecutionMode,
    failure_policy: FailurePolicy,
    deadline: Option<Duration>,
    last_run: Vec<String>,
}

impl PipelineExecutor {
    /// Builds the execution order and hands it to every reporter, in order.
    /// Structural errors are returned before any reporter is called.
    pub fn new(registry: Registry, reporters: &[Box<dyn PlanReporter>]) -> Result<Self, PipelineError> {
        let order = build_order(&registry).inspect_err(|e| {
            error!(error = %e, "invalid pipeline definition");
        })?;

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for name in &order {
            if let Some(deps) = registry.dependencies(name) {
                for dep in deps {
                    dependents.entry(dep.clone()).or_default().push(name.clone());
                }
            }
        }

        for reporter in reporters {
            reporter.report(&order);
        }

        Ok(Self {
            registry,
            order,
            dependents,
            mode: ExecutionMode::default(),
            failure_policy: FailurePolicy::default(),
            deadline: None,
            last_run: Vec::new(),
        })
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Once the deadline passes no new task is started; running ones finish.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn dependencies(&self, name: &str) -> Option<&IndexSet<String>> {
        self.registry.dependencies(name)
    }

    pub fn context(&self) -> &SharedContext {
        self.registry.context()
    }

    /// Runs the pipeline once. Dropping the returned future aborts every
    /// worker it spawned.
    pub async fn run(&mut self, ctx: CancellationToken) -> Result<RunSummary, PipelineError> {
        self.last_run.clear();
        let state = Arc::new(RunState::default());

        let started = Instant::now();
        let deadline = self.deadline.map(|d| started + d);

        let outcome = match self.mode {
            ExecutionMode::Sequential => self.run_sequential(&state, &ctx, deadline).await,
            ExecutionMode::Concurrent { max_workers } => {
                self.run_concurrent(&state, &ctx, deadline, max_workers.max(1)).await
            }
        };

        let completed = state.log.lock().await.clone();
        self.last_run = completed.clone();
        self.finish(completed, outcome, started.elapsed())
    }

    async fn run_sequential(
        &self,
        state: &RunState,
        ctx: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Outcome {
        let mut failures = Vec::new();
        let mut stop = None;

        for name in &self.order {
            stop = check_stop(ctx, deadline);
            if stop.is_some() {
                break;
            }

            let ready = {
                let completed = state.completed.lock().await;
                self.deps_completed(name, &completed)
            };
            let Some(task) = self.registry.task(name).filter(|_| ready) else {
                continue;
            };

            info!("Executing {}", name);
            match perform_caught(Arc::clone(task), ctx.clone()).await {
                Ok(()) => state.mark_completed(name).await,
                Err(e) if e.is_cancelled() => {
                    stop = Some(Stop::Cancelled);
                    break;
                }
                Err(e) => {
                    error!(task = %name, error = %e, "task failed");
                    failures.push((name.clone(), e.to_string()));
                    if self.failure_policy == FailurePolicy::Abort {
                        stop = Some(Stop::Aborted);
                        break;
                    }
                }
            }
        }

        Outcome { failures, stop }
    }

    async fn run_concurrent(
        &self,
        state: &Arc<RunState>,
        ctx: &CancellationToken,
        deadline: Option<Instant>,
        max_workers: usize,
    ) -> Outcome {
        let mut pending: VecDeque<String> = self.order.iter().cloned().collect();
        // 工作者归本次运行所有，丢弃时全部中止
        let mut workers: JoinSet<(String, Result<(), PipelineError>)> = JoinSet::new();
        let mut failures = Vec::new();
        let mut stop = None;

        loop {
            if stop.is_none() {
                stop = check_stop(ctx, deadline);
            }

            if stop.is_none() && workers.len() < max_workers {
                for name in self.take_ready(state, &mut pending, max_workers - workers.len()).await {
                    self.spawn_task(&mut workers, Arc::clone(state), ctx.clone(), name);
                }
            }

            // 没有运行中的任务：要么全部完成，要么剩余任务被阻塞
            if workers.is_empty() {
                break;
            }

            tokio::select! {
                Some(joined) = workers.join_next() => match joined {
                    Ok((name, Ok(()))) => debug!(task = %name, "task completed"),
                    Ok((_, Err(e))) if e.is_cancelled() => {
                        stop = stop.or(Some(Stop::Cancelled));
                    }
                    Ok((name, Err(e))) => {
                        error!(task = %name, error = %e, "task failed");
                        failures.push((name, e.to_string()));
                        if self.failure_policy == FailurePolicy::Abort {
                            stop = stop.or(Some(Stop::Aborted));
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "worker aborted");
                        stop = stop.or(Some(Stop::Cancelled));
                    }
                },
                _ = ctx.cancelled(), if stop.is_none() => {
                    warn!(in_flight = workers.len(), "cancelled, draining running tasks");
                    stop = Some(Stop::Cancelled);
                }
                _ = wait_until(deadline), if stop.is_none() => {
                    warn!(in_flight = workers.len(), "deadline reached, draining running tasks");
                    stop = Some(Stop::DeadlineExceeded);
                }
            }
        }

        Outcome { failures, stop }
    }

    /// Removes up to `limit` tasks whose prerequisites have all completed.
    /// Readiness is evaluated against one snapshot of the completed set.
    async fn take_ready(&self, state: &RunState, pending: &mut VecDeque<String>, limit: usize) -> Vec<String> {
        let completed = state.completed.lock().await;
        let mut ready = Vec::new();
        let mut waiting = VecDeque::with_capacity(pending.len());

        while let Some(name) = pending.pop_front() {
            if ready.len() < limit && self.deps_completed(&name, &completed) {
                ready.push(name);
            } else {
                waiting.push_back(name);
            }
        }

        *pending = waiting;
        ready
    }

    fn spawn_task(
        &self,
        workers: &mut JoinSet<(String, Result<(), PipelineError>)>,
        state: Arc<RunState>,
        ctx: CancellationToken,
        name: String,
    ) {
        let task = self.registry.task(&name).cloned();

        workers.spawn(async move {
            let Some(task) = task else {
                let err = PipelineError::failed(format!("task {} is not registered", name));
                return (name, Err(err));
            };

            info!("Executing {}", name);
            let result = perform_caught(task, ctx).await;
            if result.is_ok() {
                state.mark_completed(&name).await;
            }
            (name, result)
        });
    }

    fn deps_completed(&self, name: &str, completed: &HashSet<String>) -> bool {
        self.registry
            .dependencies(name)
            .is_none_or(|deps| deps.iter().all(|dep| completed.contains(dep)))
    }

    /// Failures take priority over a deadline or cancellation stop. Tasks that
    /// ran and failed are never listed as pending or blocked.
    fn finish(&self, completed: Vec<String>, outcome: Outcome, elapsed: Duration) -> Result<RunSummary, PipelineError> {
        let Outcome { mut failures, stop } = outcome;

        let not_run: Vec<String> = {
            let done: HashSet<&str> = completed.iter().map(String::as_str).collect();
            let failed: HashSet<&str> = failures.iter().map(|(name, _)| name.as_str()).collect();
            self.order
                .iter()
                .filter(|name| !done.contains(name.as_str()) && !failed.contains(name.as_str()))
                .cloned()
                .collect()
        };

        if !failures.is_empty() {
            let (task, message) = failures.remove(0);
            if !not_run.is_empty() {
                warn!(blocked = ?not_run, "tasks left unreachable by failure");
            }
            return Err(PipelineError::TaskExecution {
                task,
                message,
                blocked: not_run,
                other_failures: failures,
            });
        }

        // 停止时若已无剩余任务，视为正常完成
        match stop {
            Some(_) if not_run.is_empty() => {}
            Some(Stop::Cancelled) => {
                return Err(PipelineError::ContextCancelled(format!(
                    "{} task(s) not run",
                    not_run.len()
                )));
            }
            Some(Stop::DeadlineExceeded) => {
                return Err(PipelineError::DeadlineExceeded { pending: not_run });
            }
            Some(Stop::Aborted) | None => {}
        }

        info!(tasks = completed.len(), "pipeline completed in {:?}", elapsed);
        Ok(RunSummary { completed, elapsed })
    }

    /// Numbered completion order of the last run.
    pub fn completion_log(&self) -> String {
        let mut result = String::from("\n");

        for (i, step) in self.last_run.iter().enumerate() {
            result.push_str(&format!("{}. {}\n", i + 1, step));
        }

        result
    }

    pub fn graph_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        // 从无依赖的根任务开始
        for root in self.order.iter().filter(|name| {
            self.registry.dependencies(name).is_none_or(|deps| deps.is_empty())
        }) {
            lines.push(root.clone());
            self.chain_lines(root, "  ", &mut lines);
        }
        lines
    }

    fn chain_lines(&self, name: &str, prefix: &str, lines: &mut Vec<String>) {
        if let Some(children) = self.dependents.get(name) {
            for child in children {
                lines.push(format!("{}└─> {}", prefix, child));
                self.chain_lines(child, &format!("{}    ", prefix), lines);
            }
        }
    }

    pub fn print_graph(&self) {
        for line in self.graph_lines() {
            println!("{}", line);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn check_stop(ctx: &CancellationToken, deadline: Option<Instant>) -> Option<Stop> {
    if ctx.is_cancelled() {
        Some(Stop::Cancelled)
    } else if deadline.is_some_and(|d| Instant::now() >= d) {
        Some(Stop::DeadlineExceeded)
    } else {
        None
    }
}

/// Runs a task body, turning a panic into an ordinary task failure.
async fn perform_caught(task: BoxTask, ctx: CancellationToken) -> Result<(), PipelineError> {
    match AssertUnwindSafe(task.perform(ctx)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(PipelineError::failed(format!("task panicked: {}", reason)))
        }
    }
}
