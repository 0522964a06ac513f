use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use failure::ResultExt;

use crate::errors::*;

/// Assigns dense integer ids to observed tokens, for building feature
/// vectors. Each classifier owns its own table; tables only grow during
/// training and are frozen once persisted.
#[derive(Debug, Clone)]
pub struct IdManager {
    ids: HashMap<String, usize>,
}

impl IdManager {
    /// Creates a table pre-seeded with reserved feature ids, which therefore
    /// occupy the first vector slots.
    pub fn new(reserved_ids: &[&str]) -> Self {
        let mut manager = Self {
            ids: HashMap::new(),
        };
        for id in reserved_ids {
            manager.add_token(id);
        }
        manager
    }

    /// All-digit tokens collapse to one feature slot per digit count, which
    /// keeps the numeric vocabulary bounded.
    fn adjust_token(token: &str) -> String {
        if !token.is_empty() && token.chars().all(|c| c.is_numeric()) {
            token.chars().map(|_| '#').collect()
        } else {
            token.to_string()
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(&Self::adjust_token(token))
    }

    pub fn add_token(&mut self, token: &str) {
        let token = Self::adjust_token(token);
        if !self.ids.contains_key(&token) {
            let index = self.ids.len();
            self.ids.insert(token, index);
        }
    }

    pub fn add_sent(&mut self, sent: &[String]) {
        for token in sent {
            self.add_token(token);
        }
    }

    /// Zero vector sized to the current table.
    pub fn vector(&self) -> Vec<f32> {
        vec![0.0; self.ids.len()]
    }

    pub fn assign(&self, vector: &mut [f32], token: &str, value: f32) {
        if let Some(&index) = self.ids.get(&Self::adjust_token(token)) {
            vector[index] = value;
        }
    }

    pub fn save(&self, prefix: &str) -> Result<()> {
        let path = format!("{}.ids", prefix);
        let file = File::create(&path)
            .with_context(|_| format!("Could not create id table file '{}'", path))?;
        serde_json::to_writer(file, &self.ids)
            .with_context(|_| "Could not serialize id table")?;
        Ok(())
    }

    pub fn load(prefix: &str) -> Result<Self> {
        let path = format!("{}.ids", prefix);
        if !Path::new(&path).is_file() {
            failure::bail!(IntentEngineError::ModelLoad(path));
        }
        let file = File::open(&path)
            .with_context(|_| format!("Could not open id table file '{}'", path))?;
        let ids = serde_json::from_reader(file)
            .with_context(|_| format!("Invalid id table file '{}'", path))?;
        Ok(Self { ids })
    }
}
