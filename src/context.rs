use std::sync::Arc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use crate::ConfigMap;

pub type SharedContext = Arc<Context>;

/// Runtime values shared by every task of a registry.
///
/// Writes made by one task are visible to tasks that run afterwards. There is
/// no isolation between tasks and no transaction across several writes.
#[derive(Debug, Default)]
pub struct Context {
    values: RwLock<ConfigMap>,
}

impl Context {
    pub fn new(values: ConfigMap) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn shared(values: ConfigMap) -> SharedContext {
        Arc::new(Self::new(values))
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    /// JSON pointer lookup, e.g. `/tenant_info/tenant_url`.
    pub async fn pointer(&self, pointer: &str) -> Option<Value> {
        let values = self.values.read().await;
        if let Some(rest) = pointer.strip_prefix('/') {
            let (head, tail) = match rest.split_once('/') {
                Some((head, tail)) => (head, Some(tail)),
                None => (rest, None),
            };
            // 首段按 RFC 6901 解码，其余交给 Value::pointer
            let key = head.replace("~1", "/").replace("~0", "~");
            let root = values.get(&key)?;
            match tail {
                Some(tail) => root.pointer(&format!("/{}", tail)).cloned(),
                None => Some(root.clone()),
            }
        } else {
            values.get(pointer).cloned()
        }
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.write().await.insert(key.into(), value)
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().await.remove(key)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.values.read().await.contains_key(key)
    }

    pub async fn snapshot(&self) -> ConfigMap {
        self.values.read().await.clone()
    }
}
