use crate::errors::*;
use crate::id_manager::IdManager;
use crate::network::{Activation, FeedForwardNet, NetConfig, TrainingSet};
use crate::train_data::TrainData;
use crate::utils::resolve_conflicts;

const END_ID: &str = ":end";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn step(self) -> isize {
        match self {
            Direction::Left => -1,
            Direction::Right => 1,
        }
    }

    fn file_tag(self) -> &'static str {
        match self {
            Direction::Left => "l",
            Direction::Right => "r",
        }
    }
}

fn net_config() -> NetConfig {
    NetConfig {
        hidden_size: 3,
        hidden_activation: Activation::SymmetricSigmoid,
        output_activation: Activation::Sigmoid,
        bit_fail_limit: 0.1,
        max_epochs: 1000,
        max_restarts: 10,
    }
}

/// One side of an entity boundary detector: estimates whether a position is
/// the correct span edge, looking outward from the anchor placeholder.
pub struct EntityEdge {
    direction: Direction,
    ids: IdManager,
    net: FeedForwardNet,
}

impl EntityEdge {
    /// Index one past the last scannable position in the edge's direction.
    fn scan_end(direction: Direction, sent_len: usize) -> isize {
        match direction {
            Direction::Left => -1,
            Direction::Right => sent_len as isize,
        }
    }

    /// Every token from `pos` outward contributes its id slot with weight
    /// decaying as the inverse distance, plus one end-of-sentence feature.
    fn vectorize(ids: &IdManager, direction: Direction, sent: &[String], pos: usize) -> Vec<f32> {
        let mut vector = ids.vector();
        let step = direction.step();
        let end = Self::scan_end(direction, sent.len());
        let mut i = pos as isize + step;
        while i != end {
            let token = &sent[i as usize];
            if ids.contains(token) {
                let weight = 1.0 / (i - pos as isize).abs() as f32;
                ids.assign(&mut vector, token, weight);
            }
            i += step;
        }
        let end_weight = 1.0 / (end - pos as isize).abs() as f32;
        ids.assign(&mut vector, END_ID, end_weight);
        vector
    }

    pub fn match_pos(&self, sent: &[String], pos: usize) -> f32 {
        self.net
            .run(&Self::vectorize(&self.ids, self.direction, sent, pos))[0]
    }

    pub fn train(
        direction: Direction,
        token: &str,
        intent_name: &str,
        train_data: &TrainData,
    ) -> Self {
        let step = direction.step();
        let mut ids = IdManager::new(&[END_ID]);
        for sent in train_data.my_sents(intent_name) {
            if let Some(anchor) = sent.iter().position(|t| t.as_str() == token) {
                let end = Self::scan_end(direction, sent.len());
                let mut i = anchor as isize + step;
                while i != end {
                    if !sent[i as usize].starts_with('{') {
                        ids.add_token(&sent[i as usize]);
                    }
                    i += step;
                }
            }
        }

        let mut inputs: Vec<Vec<f32>> = Vec::new();
        let mut targets: Vec<Vec<f32>> = Vec::new();

        // Simulates multi-token values inside a neighboring entity by
        // replacing its placeholder with 1-3 filler tokens
        fn pollute(
            ids: &IdManager,
            direction: Direction,
            inputs: &mut Vec<Vec<f32>>,
            targets: &mut Vec<Vec<f32>>,
            sent: &[String],
            pos: usize,
            label: f32,
        ) {
            for (j, check_token) in sent.iter().enumerate() {
                let delta = j as isize - pos as isize;
                if delta.signum() == direction.step() && check_token.starts_with('{') {
                    for pollution_len in 1..4usize {
                        let mut polluted: Vec<String> = sent[..j].to_vec();
                        polluted.extend(std::iter::repeat(":0".to_string()).take(pollution_len));
                        polluted.extend(sent[j + 1..].iter().cloned());
                        let shifted = if direction == Direction::Left {
                            pos + pollution_len - 1
                        } else {
                            pos
                        };
                        inputs.push(EntityEdge::vectorize(ids, direction, &polluted, shifted));
                        targets.push(vec![label]);
                    }
                }
            }
        }

        {
            let mut add_sents = |sents: Vec<&Vec<String>>, positive: bool| {
                for sent in sents {
                    for (i, sent_token) in sent.iter().enumerate() {
                        let label = if positive && sent_token.as_str() == token {
                            1.0
                        } else {
                            0.0
                        };
                        inputs.push(Self::vectorize(&ids, direction, sent, i));
                        targets.push(vec![label]);
                        if label == 1.0 {
                            pollute(&ids, direction, &mut inputs, &mut targets, sent, i, 1.0);
                        }
                    }
                }
            };

            add_sents(train_data.my_sents(intent_name).collect(), true);
            add_sents(train_data.other_sents(intent_name).collect(), false);
        }

        let (inputs, targets) = resolve_conflicts(inputs, targets);
        let net = FeedForwardNet::train(&net_config(), &TrainingSet { inputs, targets });

        Self {
            direction,
            ids,
            net,
        }
    }

    fn file_prefix(prefix: &str, direction: Direction) -> String {
        format!("{}.{}", prefix, direction.file_tag())
    }

    pub fn save(&self, prefix: &str) -> Result<()> {
        let prefix = Self::file_prefix(prefix, self.direction);
        self.net.save(&prefix)?;
        self.ids.save(&prefix)?;
        Ok(())
    }

    pub fn from_file(direction: Direction, prefix: &str) -> Result<Self> {
        let file_prefix = Self::file_prefix(prefix, direction);
        Ok(Self {
            direction,
            net: FeedForwardNet::load(&file_prefix)?,
            ids: IdManager::load(&file_prefix)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tokenize;

    fn weather_data() -> TrainData {
        let mut data = TrainData::new();
        data.add_lines("weather", &["what is the weather in {city}"]);
        data.add_lines("greet", &["hello there", "good morning"]);
        data
    }

    #[test]
    fn test_left_edge_prefers_position_after_anchor_context() {
        // Given
        let data = weather_data();
        let edge = EntityEdge::train(Direction::Left, "{city}", "weather", &data);

        // When
        let sent = tokenize("what is the weather in boston");
        let at_entity = edge.match_pos(&sent, 5);
        let at_start = edge.match_pos(&sent, 0);

        // Then
        assert!(
            at_entity > at_start,
            "expected {} > {}",
            at_entity,
            at_start
        );
    }

    #[test]
    fn test_save_load_round_trips_scores() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("weather.pos.{city}");
        let prefix = prefix.to_str().unwrap();
        let data = weather_data();
        let edge = EntityEdge::train(Direction::Right, "{city}", "weather", &data);

        // When
        edge.save(prefix).unwrap();
        let loaded = EntityEdge::from_file(Direction::Right, prefix).unwrap();

        // Then
        let sent = tokenize("what is the weather in boston");
        for pos in 0..sent.len() {
            crate::testutils::assert_epsilon_eq(
                edge.match_pos(&sent, pos),
                loaded.match_pos(&sent, pos),
                1e-6,
            );
        }
    }
}
