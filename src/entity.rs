use std::path::Path;

use failure::bail;

use crate::errors::*;
use crate::simple_intent::SimpleIntent;
use crate::train_data::TrainData;
use crate::training_manager::Trainable;

/// A standalone named slot type (`{weekday}`, `{city}`, ...) trained from
/// example values, consulted as a validator while extracting spans.
pub struct Entity {
    hash: u32,
    simple: SimpleIntent,
}

impl Entity {
    /// Entity names are registered without braces; the wrapped form is the
    /// placeholder token templates refer to, so a brace anywhere in the
    /// name would produce a malformed placeholder.
    pub fn verify_name(name: &str) -> Result<()> {
        if name.contains('{') || name.contains('}') {
            bail!(IntentEngineError::InvalidEntityName(name.to_string()));
        }
        Ok(())
    }

    /// `city` -> `{city}`; the skill-scoped `Skill:city` -> `Skill:{city}`.
    pub fn wrap_name(name: &str) -> String {
        match name.find(':') {
            Some(index) => format!("{}:{{{}}}", &name[..index], &name[index + 1..]),
            None => format!("{{{}}}", name),
        }
    }

    pub fn match_sent(&self, sent: &[String]) -> f32 {
        self.simple.match_sent(sent)
    }
}

impl Trainable for Entity {
    fn train(name: &str, hash: u32, train_data: &TrainData) -> Self {
        Self {
            hash,
            simple: SimpleIntent::train(name, train_data),
        }
    }

    fn name(&self) -> &str {
        self.simple.name()
    }

    fn save(&self, folder: &Path) -> Result<()> {
        let prefix = folder.join(self.name());
        let prefix = prefix.to_string_lossy();
        crate::training_manager::save_hash(&prefix, self.hash)?;
        self.simple.save_bare(&prefix)
    }

    fn from_file(name: &str, folder: &Path) -> Result<Self> {
        let prefix = folder.join(name);
        let prefix = prefix.to_string_lossy();
        Ok(Self {
            hash: crate::training_manager::load_hash(&prefix)?,
            simple: SimpleIntent::from_file_bare(name, &prefix)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_name_adds_braces() {
        assert_eq!("{city}", Entity::wrap_name("city"));
        assert_eq!("WeatherSkill:{city}", Entity::wrap_name("WeatherSkill:city"));
    }

    #[test]
    fn test_verify_name_rejects_braces_anywhere() {
        assert!(Entity::verify_name("city").is_ok());
        assert!(Entity::verify_name("Skill:city").is_ok());
        assert!(Entity::verify_name("{city}").is_err());
        assert!(Entity::verify_name("city}").is_err());
        assert!(Entity::verify_name("a{b}c").is_err());
    }

    #[test]
    fn test_trained_entity_scores_member_values_higher() {
        // Given
        let mut data = TrainData::new();
        data.add_lines("{city}", &["boston", "paris", "london"]);

        // When
        let entity = Entity::train("{city}", 0, &data);

        // Then
        let member = entity.match_sent(&crate::utils::tokenize("boston"));
        let stranger = entity.match_sent(&crate::utils::tokenize("zzgibberish"));
        assert!(member > stranger);
    }
}
