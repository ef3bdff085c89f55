use dagpipe::{
    ConfigMap, ConsolePlanReporter, ExecutionMode, PipelineError, PipelineExecutor, PlanReporter, Registry,
    SharedContext, StaticConfigProvider, Task, TaskExt, YamlConfigProvider,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

struct BaseTask {
    ctx: SharedContext,
}

#[async_trait]
impl Task for BaseTask {
    async fn perform(&self, _ctx: CancellationToken) -> Result<(), PipelineError> {
        let greeting = self
            .ctx
            .get("greeting")
            .await
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "Hello!".to_string());
        println!("{}", greeting);
        self.ctx.set("base_done", serde_json::json!(true)).await;
        Ok(())
    }
}

// 模拟一个前两次返回 500 的 HTTP 调用
struct Task1 {
    calls: AtomicU32,
}

#[async_trait]
impl Task for Task1 {
    async fn perform(&self, _ctx: CancellationToken) -> Result<(), PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        if call < 2 {
            println!("Task1 failed with error 500, retrying...");
            return Err(PipelineError::failed("Error 500"));
        }
        println!("Task1 completed successfully");
        Ok(())
    }

    fn retry_handler(&self, error: &PipelineError) -> bool {
        error.to_string().contains("500")
    }
}

struct AlwaysFailsTask;

#[async_trait]
impl Task for AlwaysFailsTask {
    async fn perform(&self, _ctx: CancellationToken) -> Result<(), PipelineError> {
        println!("AlwaysFailsTask failed");
        Err(PipelineError::failed("AlwaysFailsTask failed"))
    }

    fn retry_handler(&self, _error: &PipelineError) -> bool {
        true
    }
}

struct Task2;

#[async_trait]
impl Task for Task2 {
    async fn perform(&self, _ctx: CancellationToken) -> Result<(), PipelineError> {
        println!("Task2 completed successfully");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut registry = match std::env::args().nth(1) {
        Some(path) => Registry::from_provider(&YamlConfigProvider::new(path))?,
        None => {
            let mut config = ConfigMap::new();
            config.insert("greeting".to_string(), serde_json::json!("Hello!"));
            Registry::from_provider(&StaticConfigProvider::new(config))?
        }
    };

    registry.register_root_with("BaseTask", |ctx| BaseTask { ctx })?;
    registry.register("Task1", Task1 { calls: AtomicU32::new(0) }.retries(3), ["BaseTask"])?;
    registry.register("AlwaysFailsTask", AlwaysFailsTask.retries(3).skippable(), ["BaseTask"])?;
    registry.register("Task2", Task2, ["AlwaysFailsTask"])?;

    let reporters: Vec<Box<dyn PlanReporter>> = vec![Box::new(ConsolePlanReporter)];
    let mut executor = PipelineExecutor::new(registry, &reporters)?.with_mode(ExecutionMode::concurrent());

    println!("=== 任务依赖图 ===");
    executor.print_graph();

    println!("=== 开始执行任务 ===");
    let summary = executor.run(CancellationToken::new()).await?;

    println!("=== 执行完成 ===");
    println!("执行时间: {:?}", summary.elapsed);
    println!("执行顺序: {}", executor.completion_log());

    Ok(())
}
