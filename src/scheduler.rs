use std::collections::{HashMap, VecDeque};
use tracing::debug;
use crate::{find_cycle, PipelineError, Registry};

/// Kahn's algorithm over the registry. Ties are broken by registration
/// order, so the same registry always yields the same order.
pub fn build_order(registry: &Registry) -> Result<Vec<String>, PipelineError> {
    registry.validate()?;

    let edges = registry.edges();
    let mut in_degrees: HashMap<&str, usize> = HashMap::with_capacity(edges.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    // 入度 = 前置任务数；反向边按注册顺序记录
    for (name, deps) in edges {
        in_degrees.insert(name.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut queue: VecDeque<&str> = edges
        .keys()
        .map(String::as_str)
        .filter(|name| in_degrees[name] == 0)
        .collect();
    let mut order = Vec::with_capacity(edges.len());

    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());

        if let Some(children) = dependents.get(name) {
            for child in children {
                if let Some(degree) = in_degrees.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }
    }

    if order.len() < edges.len() {
        let unresolved: Vec<String> = edges
            .keys()
            .filter(|name| in_degrees[name.as_str()] > 0)
            .cloned()
            .collect();
        let cycle = find_cycle(edges).unwrap_or_default();
        return Err(PipelineError::CyclicDependency { unresolved, cycle });
    }

    debug!(order = ?order, "built execution order");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;
    use crate::{ConfigMap, Context, Task};

    struct Noop;

    #[async_trait]
    impl Task for Noop {
        async fn perform(&self, _ctx: CancellationToken) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn registry(spec: &[(&str, &[&str])]) -> Registry {
        let mut reg = Registry::new(Context::shared(ConfigMap::new()));
        for (name, deps) in spec {
            reg.register(*name, Noop, deps.iter().copied()).unwrap();
        }
        reg
    }

    fn assert_respects_edges(reg: &Registry, order: &[String]) {
        assert_eq!(order.len(), reg.len());
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        for name in reg.names() {
            for dep in reg.dependencies(name).unwrap() {
                assert!(position(dep) < position(name), "{} must run before {}", dep, name);
            }
        }
    }

    #[test]
    fn orders_dependencies_first_with_registration_tie_break() {
        let reg = registry(&[
            ("Job1Task1", &[]),
            ("Job1Task2", &["Job2Task2"]),
            ("Job2Task1", &[]),
            ("Job2Task2", &[]),
        ]);
        let order = build_order(&reg).unwrap();
        assert_eq!(order, vec!["Job1Task1", "Job2Task1", "Job2Task2", "Job1Task2"]);
        assert_respects_edges(&reg, &order);
    }

    #[test]
    fn diamond_graph() {
        let reg = registry(&[
            ("t3", &["t1", "t2"]),
            ("t2", &["base"]),
            ("t1", &["base"]),
            ("base", &[]),
        ]);
        let order = build_order(&reg).unwrap();
        assert_eq!(order, vec!["base", "t2", "t1", "t3"]);
        assert_respects_edges(&reg, &order);
    }

    #[test]
    fn wide_graph_respects_every_edge() {
        let reg = registry(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a", "b"]),
            ("d", &[]),
            ("e", &["d", "c"]),
            ("f", &["e", "a"]),
            ("g", &["b", "d"]),
        ]);
        let order = build_order(&reg).unwrap();
        assert_respects_edges(&reg, &order);
    }

    #[test]
    fn building_twice_is_identical() {
        let reg = registry(&[("a", &[]), ("c", &["a"]), ("b", &["a"]), ("d", &["b", "c"])]);
        assert_eq!(build_order(&reg).unwrap(), build_order(&reg).unwrap());
    }

    #[test]
    fn cycle_names_unresolved_tasks() {
        let reg = registry(&[("root", &[]), ("a", &["root", "c"]), ("b", &["a"]), ("c", &["b"]), ("leaf", &["a"])]);
        match build_order(&reg).unwrap_err() {
            PipelineError::CyclicDependency { unresolved, cycle } => {
                assert_eq!(unresolved, vec!["a", "b", "c", "leaf"]);
                assert_eq!(cycle, vec!["a", "c", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_dependency_is_reported_before_cycles() {
        let reg = registry(&[("a", &["b"]), ("b", &["a"]), ("c", &["ghost"])]);
        assert!(matches!(
            build_order(&reg),
            Err(PipelineError::UnknownDependency { ref dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn empty_registry_has_empty_order() {
        let reg = registry(&[]);
        assert!(build_order(&reg).unwrap().is_empty());
    }
}
