use std::collections::HashMap;
use std::path::Path;

use crate::entity::Entity;
use crate::training_manager::{TrainOptions, Trainable, TrainingManager};

/// Registration and lookup of standalone entities. The lookup table is
/// rebuilt after every training round and consulted while matching intents
/// to validate extracted spans.
pub struct EntityManager {
    manager: TrainingManager<Entity>,
    entity_dict: HashMap<String, usize>,
}

impl EntityManager {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            manager: TrainingManager::new(cache_dir),
            entity_dict: HashMap::new(),
        }
    }

    pub fn add<S: AsRef<str>>(
        &mut self,
        wrapped_name: &str,
        lines: &[S],
        reload_cache: bool,
        must_train: bool,
    ) -> crate::errors::Result<()> {
        self.manager
            .add(wrapped_name, lines, reload_cache, must_train)
    }

    pub fn load(
        &mut self,
        wrapped_name: &str,
        file_name: &Path,
        reload_cache: bool,
    ) -> crate::errors::Result<()> {
        self.manager.load(wrapped_name, file_name, reload_cache)
    }

    pub fn remove(&mut self, wrapped_name: &str) {
        self.manager.remove(wrapped_name)
    }

    pub fn train(&mut self, options: TrainOptions) {
        self.manager.train(options)
    }

    /// Rebuilds the name lookup over the currently loaded entities.
    pub fn calc_ent_dict(&mut self) {
        self.entity_dict = self
            .manager
            .objects()
            .iter()
            .enumerate()
            .map(|(index, entity)| (entity.name().to_string(), index))
            .collect();
    }

    /// Resolves a placeholder to its validator entity; an intent-local
    /// `Skill:{token}` registration shadows the global `{token}` one.
    pub fn find(&self, intent_name: &str, token: &str) -> Option<&Entity> {
        let skill_prefix = intent_name.split(':').next().unwrap_or(intent_name);
        let local_name = format!("{}:{}", skill_prefix, token);
        self.entity_dict
            .get(&local_name)
            .or_else(|| self.entity_dict.get(token))
            .map(|&index| &self.manager.objects()[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train_data::TrainData;

    #[test]
    fn test_find_prefers_the_intent_local_entity() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut manager = EntityManager::new(dir.path());
        let mut data = TrainData::new();
        data.add_lines("{city}", &["boston"]);

        manager.manager.objects_mut().push(Entity::train("{city}", 0, &data));
        manager
            .manager
            .objects_mut()
            .push(Entity::train("WeatherSkill:{city}", 0, &data));
        manager.calc_ent_dict();

        // When / Then
        assert_eq!(
            Some("WeatherSkill:{city}"),
            manager.find("WeatherSkill:weather", "{city}").map(|e| e.name())
        );
        assert_eq!(
            Some("{city}"),
            manager.find("OtherSkill:weather", "{city}").map(|e| e.name())
        );
        assert!(manager.find("OtherSkill:weather", "{weekday}").is_none());
    }
}
