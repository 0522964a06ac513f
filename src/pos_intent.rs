use itertools::iproduct;

use crate::entity::Entity;
use crate::entity_edge::{Direction, EntityEdge};
use crate::errors::*;
use crate::match_data::MatchData;
use crate::train_data::TrainData;

/// Candidate boundaries scoring below this are not explored.
const MIN_EDGE_CONF: f32 = 0.2;

/// Extracts one entity span: a pair of boundary classifiers attached to a
/// `{placeholder}` token of an intent's templates.
pub struct PosIntent {
    token: String,
    left: EntityEdge,
    right: EntityEdge,
}

impl PosIntent {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn train(token: &str, intent_name: &str, train_data: &TrainData) -> Self {
        Self {
            token: token.to_string(),
            left: EntityEdge::train(Direction::Left, token, intent_name, train_data),
            right: EntityEdge::train(Direction::Right, token, intent_name, train_data),
        }
    }

    /// Explores every boundary pair in the hypothesis sentence and returns
    /// one new hypothesis per plausible span. The parent hypothesis keeps
    /// accumulating `sqrt(position_conf * entity_conf) - 0.5`, so repeated
    /// low-confidence extractions drag the total down rather than pile up.
    pub fn match_data(&self, orig_data: &MatchData, entity: Option<&Entity>) -> Vec<MatchData> {
        let sent = &orig_data.sent;
        let left_scores: Vec<f32> = (0..sent.len())
            .map(|pos| self.left.match_pos(sent, pos))
            .collect();
        let right_scores: Vec<f32> = (0..sent.len())
            .map(|pos| self.right.match_pos(sent, pos))
            .collect();

        // A span may not cover a placeholder some earlier extraction left in
        let is_valid = |l_pos: usize, r_pos: usize| {
            l_pos <= r_pos && !sent[l_pos..=r_pos].iter().any(|t| t.starts_with('{'))
        };

        let mut possible_matches = Vec::new();
        let boundary_pairs = iproduct!(
            left_scores.iter().enumerate(),
            right_scores.iter().enumerate()
        );
        for ((l_pos, &l_conf), (r_pos, &r_conf)) in boundary_pairs {
            if l_conf < MIN_EDGE_CONF || r_conf < MIN_EDGE_CONF || !is_valid(l_pos, r_pos) {
                continue;
            }

            let extracted: Vec<String> = sent[l_pos..=r_pos].to_vec();

            let pos_conf = (l_conf - 0.5 + r_conf - 0.5) / 2.0 + 0.5;
            let ent_conf = entity.map(|e| e.match_sent(&extracted)).unwrap_or(1.0);

            let mut new_sent: Vec<String> = sent[..l_pos].to_vec();
            new_sent.push(self.token.clone());
            new_sent.extend(sent[r_pos + 1..].iter().cloned());

            let mut new_matches = orig_data.matches.clone();
            new_matches.insert(self.token.clone(), extracted);

            let extra_conf = (pos_conf * ent_conf).sqrt() - 0.5;
            possible_matches.push(MatchData {
                name: orig_data.name.clone(),
                sent: new_sent,
                matches: new_matches,
                conf: orig_data.conf + extra_conf,
            });
        }
        possible_matches
    }

    pub fn save(&self, prefix: &str) -> Result<()> {
        let prefix = format!("{}.{}", prefix, self.token);
        self.left.save(&prefix)?;
        self.right.save(&prefix)?;
        Ok(())
    }

    pub fn from_file(prefix: &str, token: &str) -> Result<Self> {
        let file_prefix = format!("{}.{}", prefix, token);
        Ok(Self {
            token: token.to_string(),
            left: EntityEdge::from_file(Direction::Left, &file_prefix)?,
            right: EntityEdge::from_file(Direction::Right, &file_prefix)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tokenize;

    fn trained_pos_intent() -> (PosIntent, TrainData) {
        let mut data = TrainData::new();
        data.add_lines("weather", &["what is the weather in {city}"]);
        data.add_lines("greet", &["hello there", "good morning"]);
        (PosIntent::train("{city}", "weather", &data), data)
    }

    #[test]
    fn test_extracts_trailing_entity_span() {
        // Given
        let (pos_intent, _) = trained_pos_intent();
        let hypothesis = MatchData::new("weather", tokenize("what is the weather in boston"));

        // When
        let matches = pos_intent.match_data(&hypothesis, None);

        // Then
        let best = matches
            .iter()
            .max_by(|a, b| a.conf.partial_cmp(&b.conf).unwrap())
            .expect("no hypotheses produced");
        assert_eq!(Some(&tokenize("boston")), best.matches.get("{city}"));
        assert_eq!(tokenize("what is the weather in {city}"), best.sent);
    }

    #[test]
    fn test_spans_never_cover_already_extracted_placeholders() {
        // Given
        let (pos_intent, _) = trained_pos_intent();
        let hypothesis = MatchData::new("weather", tokenize("what is the weather in {city}"));

        // When
        let matches = pos_intent.match_data(&hypothesis, None);

        // Then
        for m in matches {
            let extracted = &m.matches["{city}"];
            assert!(!extracted.iter().any(|t| t.starts_with('{')));
        }
    }

    #[test]
    fn test_save_load_round_trips_scores() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("weather.pos");
        let prefix = prefix.to_str().unwrap();
        let (pos_intent, _) = trained_pos_intent();

        // When
        pos_intent.save(prefix).unwrap();
        let loaded = PosIntent::from_file(prefix, "{city}").unwrap();

        // Then
        let hypothesis = MatchData::new("weather", tokenize("what is the weather in paris"));
        let original: Vec<f32> = pos_intent
            .match_data(&hypothesis, None)
            .iter()
            .map(|m| m.conf)
            .collect();
        let reloaded: Vec<f32> = loaded
            .match_data(&hypothesis, None)
            .iter()
            .map(|m| m.conf)
            .collect();
        assert_eq!(original.len(), reloaded.len());
        for (a, b) in original.iter().zip(reloaded.iter()) {
            crate::testutils::assert_epsilon_eq(*a, *b, 1e-6);
        }
    }
}
