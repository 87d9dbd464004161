//! Feature-matrix shape and model definitions

use cyclebar_core::{MatrixShape, ModelSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Rows per slice
    pub height: usize,
    /// Columns per slice, including the leading direction column
    pub width: usize,
    /// Models to emit; columns by snake_case name
    pub models: Vec<ModelSpec>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let shape = MatrixShape::default();
        Self {
            height: shape.height,
            width: shape.width,
            models: ModelSpec::defaults(),
        }
    }
}

impl ModelConfig {
    pub fn shape(&self) -> MatrixShape {
        MatrixShape {
            height: self.height,
            width: self.width,
        }
    }

    /// Keep only the named models; unknown names are returned as the error
    pub fn select(&mut self, names: &[String]) -> Result<(), Vec<String>> {
        let unknown: Vec<String> = names
            .iter()
            .filter(|n| !self.models.iter().any(|m| &m.name == *n))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(unknown);
        }
        self.models.retain(|m| names.contains(&m.name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_models() {
        let config = ModelConfig::default();
        let names: Vec<&str> = config.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cycle_length", "cycle_change", "bar_change", "bar_volume"]
        );
        for model in &config.models {
            assert!(model.check_width(config.shape()).is_ok());
        }
    }

    #[test]
    fn test_select_models() {
        let mut config = ModelConfig::default();
        assert_eq!(
            config.select(&["nope".to_string()]),
            Err(vec!["nope".to_string()])
        );
        assert_eq!(config.models.len(), 4);

        config.select(&["bar_change".to_string()]).unwrap();
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].name, "bar_change");
    }
}
