use std::fs;
use std::path::{Path, PathBuf};
use serde_json::Value;
use crate::{ConfigMap, PipelineError};

/// Supplies the initial context before any task registers.
pub trait ConfigProvider {
    fn get_config(&self) -> Result<ConfigMap, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct YamlConfigProvider {
    path: PathBuf,
}

impl YamlConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(source: &str) -> Result<ConfigMap, PipelineError> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(source)
            .map_err(|e| PipelineError::Config(format!("invalid YAML: {}", e)))?;

        // YAML 键可能不是字符串，转换失败视为配置错误
        let value = serde_json::to_value(yaml)
            .map_err(|e| PipelineError::Config(format!("unsupported YAML value: {}", e)))?;

        match value {
            Value::Null => Ok(ConfigMap::new()),
            Value::Object(map) => Ok(map),
            other => Err(PipelineError::Config(format!(
                "top-level config must be a mapping, got {}",
                kind(&other)
            ))),
        }
    }
}

impl ConfigProvider for YamlConfigProvider {
    fn get_config(&self) -> Result<ConfigMap, PipelineError> {
        let source = fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::Config(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        Self::parse(&source)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    values: ConfigMap,
}

impl StaticConfigProvider {
    pub fn new(values: ConfigMap) -> Self {
        Self { values }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get_config(&self) -> Result<ConfigMap, PipelineError> {
        Ok(self.values.clone())
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn loads_nested_mapping_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tenant_info:\n  tenant_url: http://localhost:8080/tenants\n  entity_name: acme\nmax_attempts: 3").unwrap();

        let config = YamlConfigProvider::new(file.path()).get_config().unwrap();
        assert_eq!(config["tenant_info"]["entity_name"], json!("acme"));
        assert_eq!(config["max_attempts"], json!(3));
    }

    #[test]
    fn empty_document_is_an_empty_context() {
        assert!(YamlConfigProvider::parse("").unwrap().is_empty());
    }

    #[test]
    fn rejects_non_mapping_documents() {
        let err = YamlConfigProvider::parse("- a\n- b\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref msg) if msg.contains("sequence")));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let provider = YamlConfigProvider::new("/definitely/not/here.yml");
        assert!(matches!(provider.get_config(), Err(PipelineError::Config(_))));
    }
}
