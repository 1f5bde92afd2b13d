use std::collections::HashMap;

use sn_tensor::Tensor;

use crate::error::{ModelError, Result};

/// Name of the `index`-th positional variable of a transform network
/// checkpoint: `Variable`, `Variable_1`, `Variable_2`, ...
pub fn var_name(index: usize) -> String {
    if index == 0 {
        "Variable".to_string()
    } else {
        format!("Variable_{index}")
    }
}

/// Read-only mapping from checkpoint keys to host tensors.
///
/// Populated once by a [`VariableLoader`]; variables never enter a device
/// arena, so they stay valid across any number of inference calls.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    vars: HashMap<String, Tensor>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key`, failing with [`ModelError::MissingVariable`].
    pub fn get(&self, key: &str) -> Result<&Tensor> {
        self.vars
            .get(key)
            .ok_or_else(|| ModelError::MissingVariable(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl FromIterator<(String, Tensor)> for VariableStore {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        VariableStore {
            vars: iter.into_iter().collect(),
        }
    }
}

impl From<HashMap<String, Tensor>> for VariableStore {
    fn from(vars: HashMap<String, Tensor>) -> Self {
        VariableStore { vars }
    }
}

/// Source of a model's weights.
///
/// `load_all` resolves every variable or fails as a whole; a partially
/// populated store is never returned.
pub trait VariableLoader {
    /// Where the variables come from, for diagnostics.
    fn source_location(&self) -> String;

    fn load_all(&self) -> Result<VariableStore>;
}

/// Loader over variables already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    vars: HashMap<String, Tensor>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) -> &mut Self {
        self.vars.insert(key.into(), tensor);
        self
    }
}

impl FromIterator<(String, Tensor)> for MemoryLoader {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        MemoryLoader {
            vars: iter.into_iter().collect(),
        }
    }
}

impl VariableLoader for MemoryLoader {
    fn source_location(&self) -> String {
        "memory".to_string()
    }

    fn load_all(&self) -> Result<VariableStore> {
        // Device tensors would dangle once their scope closes.
        if let Some((key, _)) = self.vars.iter().find(|(_, t)| t.is_device()) {
            return Err(ModelError::LoadFailure {
                source_location: self.source_location(),
                reason: format!("variable {key} is a device tensor"),
            });
        }
        Ok(VariableStore::from(self.vars.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_var_name() {
        assert_eq!(var_name(0), "Variable");
        assert_eq!(var_name(1), "Variable_1");
        assert_eq!(var_name(45), "Variable_45");
    }

    #[test]
    fn test_missing_variable() {
        let store = VariableStore::new();
        assert_matches!(store.get("Variable"), Err(ModelError::MissingVariable(key)) if key == "Variable");
    }

    #[test]
    fn test_memory_loader() {
        let mut loader = MemoryLoader::new();
        loader
            .insert("b", Tensor::zeros([2]))
            .insert("a", Tensor::ones([1, 1, 2, 2]));
        let store = loader.load_all().unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.keys(), vec!["a", "b"]);
        assert_eq!(store.get("a").unwrap().shape().dims(), &[1, 1, 2, 2]);
    }
}
