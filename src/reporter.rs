use tracing::info;

pub trait PlanReporter: Send + Sync {
    fn report(&self, plan: &[String]);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePlanReporter;

impl ConsolePlanReporter {
    pub fn render(plan: &[String]) -> String {
        format!("\x1b[1;32mPlan : {}\x1b[0m", plan.join(" -> "))
    }
}

impl PlanReporter for ConsolePlanReporter {
    fn report(&self, plan: &[String]) {
        println!("{}", Self::render(plan));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPlanReporter;

impl PlanReporter for TracingPlanReporter {
    fn report(&self, plan: &[String]) {
        info!(tasks = plan.len(), "plan: {}", plan.join(" -> "));
    }
}
