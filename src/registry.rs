use std::sync::Arc;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;
use crate::{BoxTask, ConfigProvider, Context, PipelineError, SharedContext, Task};

/// Task identity → instance and task identity → prerequisites, both kept in
/// registration order so every derived order is reproducible.
pub struct Registry {
    context: SharedContext,
    tasks: IndexMap<String, BoxTask>,
    dependencies: IndexMap<String, IndexSet<String>>,
}

impl Registry {
    pub fn new(context: SharedContext) -> Self {
        Self {
            context,
            tasks: IndexMap::new(),
            dependencies: IndexMap::new(),
        }
    }

    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self, PipelineError> {
        let config = provider.get_config()?;
        Ok(Self::new(Context::shared(config)))
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Registers `task` under `name`. Dependencies are checked later, when
    /// the execution order is built.
    pub fn register<T, I, S>(&mut self, name: impl Into<String>, task: T, depends_on: I) -> Result<(), PipelineError>
    where
        T: Task + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(name.into(), Arc::new(task), depends_on)
    }

    /// Registers a task with no prerequisites.
    pub fn register_root<T>(&mut self, name: impl Into<String>, task: T) -> Result<(), PipelineError>
    where
        T: Task + 'static,
    {
        self.insert(name.into(), Arc::new(task), std::iter::empty::<String>())
    }

    pub fn add<I, S>(&mut self, name: impl Into<String>, task: BoxTask, depends_on: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(name.into(), task, depends_on)
    }

    /// Builds the task from the shared context, then registers it.
    pub fn register_with<T, F, I, S>(&mut self, name: impl Into<String>, depends_on: I, build: F) -> Result<(), PipelineError>
    where
        T: Task + 'static,
        F: FnOnce(SharedContext) -> T,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if self.tasks.contains_key(&name) {
            return Err(PipelineError::DuplicateTask(name));
        }
        let task = build(Arc::clone(&self.context));
        self.insert(name, Arc::new(task), depends_on)
    }

    pub fn register_root_with<T, F>(&mut self, name: impl Into<String>, build: F) -> Result<(), PipelineError>
    where
        T: Task + 'static,
        F: FnOnce(SharedContext) -> T,
    {
        self.register_with(name, std::iter::empty::<String>(), build)
    }

    fn insert<I, S>(&mut self, name: String, task: BoxTask, depends_on: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.tasks.contains_key(&name) {
            return Err(PipelineError::DuplicateTask(name));
        }

        let deps: IndexSet<String> = depends_on.into_iter().map(Into::into).collect();
        debug!(task = %name, dependencies = ?deps, "registered task");

        self.tasks.insert(name.clone(), task);
        self.dependencies.insert(name, deps);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn task(&self, name: &str) -> Option<&BoxTask> {
        self.tasks.get(name)
    }

    pub fn dependencies(&self, name: &str) -> Option<&IndexSet<String>> {
        self.dependencies.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub(crate) fn edges(&self) -> &IndexMap<String, IndexSet<String>> {
        &self.dependencies
    }

    /// Every dependency must name a registered task.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, deps) in &self.dependencies {
            if let Some(missing) = deps.iter().find(|dep| !self.tasks.contains_key(*dep)) {
                return Err(PipelineError::UnknownDependency {
                    task: name.clone(),
                    dependency: missing.clone(),
                });
            }
        }
        Ok(())
    }
}
