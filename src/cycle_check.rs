use std::collections::HashSet;
use indexmap::{IndexMap, IndexSet};

/// Returns one dependency cycle as a path whose first and last entries are
/// the same task, e.g. `[a, b, a]`. Nodes are visited in registration order.
pub fn find_cycle(edges: &IndexMap<String, IndexSet<String>>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut stack: Vec<String> = Vec::new();

    fn dfs(
        task_name: &str,
        edges: &IndexMap<String, IndexSet<String>>,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|name| name == task_name) {
            // 回到递归栈中的节点，截取环路
            let mut cycle = stack[pos..].to_vec();
            cycle.push(task_name.to_string());
            return Some(cycle);
        }
        if visited.contains(task_name) {
            return None;
        }

        visited.insert(task_name.to_string());
        stack.push(task_name.to_string());

        if let Some(deps) = edges.get(task_name) {
            for dep in deps {
                if let Some(cycle) = dfs(dep, edges, visited, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        None
    }

    for task_name in edges.keys() {
        if !visited.contains(task_name) {
            if let Some(cycle) = dfs(task_name, edges, &mut visited, &mut stack) {
                return Some(cycle);
            }
        }
    }

    None
}
