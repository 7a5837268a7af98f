//! Random test documents
//!
//! Every document carries a fixed number of random string fields plus one
//! phrase field drawn from a small vocabulary, so query and search workloads
//! always have something to match.

use cbscale_common::constants::PHRASE_FIELD;
use rand::{distr::Alphanumeric, rngs::StdRng, Rng, SeedableRng};
use serde_json::{Map, Value};

/// Number of random fields per document
pub const FIELD_COUNT: usize = 25;

/// Length of every random key and value
pub const FIELD_LENGTH: usize = 25;

/// Vocabulary for the phrase field
pub const PHRASES: &[&str] = &[
    "vanderbilt",
    "university",
    "research",
    "vandy",
    "professor",
    "scholastic",
    "commodore",
    "cornelius",
    "school",
    "computer science",
    "compsci",
    "academic",
    "innovation",
    "distributed systems",
    "distrosys",
    "nashville",
    "tn",
    "tennessee",
    "knowledge",
    "immersive",
    "community",
    "faculty",
    "groundbreaking",
    "engineering",
    "technology",
    "education",
    "impact",
    "cyber-physical",
    "biophotonics",
    "biomedical imaging",
    "entrepreneur",
    "collaboration",
    "international",
];

pub struct RandomDocumentGenerator {
    rng: StdRng,
}

impl RandomDocumentGenerator {
    /// Generator seeded from the OS
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Generator producing the same sequence for the same seed
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn random_string(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    pub fn random_phrase(&mut self) -> &'static str {
        PHRASES[self.rng.random_range(0..PHRASES.len())]
    }

    pub fn random_document(&mut self) -> Value {
        let mut fields = Map::with_capacity(FIELD_COUNT + 1);
        while fields.len() < FIELD_COUNT {
            let key = self.random_string(FIELD_LENGTH);
            let value = self.random_string(FIELD_LENGTH);
            fields.insert(key, Value::String(value));
        }
        fields.insert(
            PHRASE_FIELD.to_string(),
            Value::String(self.random_phrase().to_string()),
        );
        Value::Object(fields)
    }
}

impl Default for RandomDocumentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let mut generator = RandomDocumentGenerator::seeded(7);
        let document = generator.random_document();
        let fields = document.as_object().unwrap();

        assert_eq!(fields.len(), FIELD_COUNT + 1);
        let phrase = fields[PHRASE_FIELD].as_str().unwrap();
        assert!(PHRASES.contains(&phrase));
        for (key, value) in fields.iter().filter(|(k, _)| k.as_str() != PHRASE_FIELD) {
            assert_eq!(key.len(), FIELD_LENGTH);
            assert_eq!(value.as_str().unwrap().len(), FIELD_LENGTH);
        }
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = RandomDocumentGenerator::seeded(42);
        let mut b = RandomDocumentGenerator::seeded(42);
        assert_eq!(a.random_document(), b.random_document());
        assert_eq!(a.random_phrase(), b.random_phrase());
    }
}
