use crate::errors::{CompetitionError, StoreError};
use crate::model::{BackendResult, Suggestion};
use crate::roster::Roster;
use crate::storage::Store;

/// Longest accepted word, counted in characters after trimming.
pub const MAX_WORD_CHARS: usize = 100;

pub fn normalize_word(raw: &str) -> Result<String, CompetitionError> {
    let word = raw.trim().to_lowercase();
    if word.is_empty() {
        return Err(CompetitionError::InvalidInput("word is empty".into()));
    }
    let len = word.chars().count();
    if len > MAX_WORD_CHARS {
        return Err(CompetitionError::InvalidInput(format!(
            "word is {} characters, limit is {}",
            len, MAX_WORD_CHARS
        )));
    }
    Ok(word)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The word was seen before; its result rows may still be pending.
    Existing(Suggestion),
    /// This call created the suggestion together with one pending row per backend.
    Created {
        suggestion: Suggestion,
        slots: Vec<BackendResult>,
    },
}

/// Maps words to durable suggestions, creating them at most once.
#[derive(Clone)]
pub struct WordRegistry {
    store: Store,
    roster: Roster,
}

impl WordRegistry {
    pub fn new(store: Store, roster: Roster) -> Self {
        Self { store, roster }
    }

    pub fn resolve(&self, raw: &str) -> Result<Resolution, CompetitionError> {
        let word = normalize_word(raw)?;

        if let Some(existing) = self.store.find_suggestion(&word)? {
            return Ok(Resolution::Existing(existing));
        }
        self.create_or_adopt(&word)
    }

    /// Inserts a suggestion for an already normalized word after a lookup
    /// miss. When another writer got there first, its row is returned.
    fn create_or_adopt(&self, word: &str) -> Result<Resolution, CompetitionError> {
        match self.store.create_suggestion(word, &self.roster) {
            Ok((suggestion, slots)) => Ok(Resolution::Created { suggestion, slots }),
            Err(e) if e.is_conflict() => {
                let winner = self.store.find_suggestion(word)?.ok_or_else(|| {
                    StoreError::Corrupt(format!("suggestion '{}' vanished after conflict", word))
                })?;
                tracing::info!(
                    event = "registry.conflict_recovered",
                    word = %word,
                    suggestion_id = winner.id
                );
                Ok(Resolution::Existing(winner))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{BackendSpec, Shaping};

    fn roster() -> Roster {
        Roster::new(vec![
            BackendSpec::new("A", "vendor/a", Shaping::Default),
            BackendSpec::new("B", "vendor/b", Shaping::Default),
        ])
        .unwrap()
    }

    fn result_rows(store: &Store) -> i64 {
        store
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM backend_results", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn losing_insert_adopts_the_row_another_writer_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("punchline.db");
        let ours = Store::open(&path).unwrap();
        ours.init_schema().unwrap();
        let theirs = Store::open(&path).unwrap();

        let registry = WordRegistry::new(ours.clone(), roster());
        // The other handle wins between our lookup and our insert.
        let (winner, _) = theirs.create_suggestion("coffee", &roster()).unwrap();

        match registry.create_or_adopt("coffee").unwrap() {
            Resolution::Existing(s) => {
                assert_eq!(s.id, winner.id);
                assert_eq!(s.word, "coffee");
            }
            other => panic!("expected the existing suggestion, got {:?}", other),
        }
        assert_eq!(result_rows(&ours), 2);

        let again = registry.resolve("  COFFEE").unwrap();
        assert_eq!(again, Resolution::Existing(winner));
        assert_eq!(result_rows(&ours), 2);
    }

    #[test]
    fn first_resolve_creates_one_pending_row_per_backend() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let registry = WordRegistry::new(store.clone(), roster());

        match registry.resolve("Tea").unwrap() {
            Resolution::Created { suggestion, slots } => {
                assert_eq!(suggestion.word, "tea");
                assert_eq!(slots.len(), 2);
                assert!(slots.iter().all(|r| !r.is_completed()));
            }
            other => panic!("expected a new suggestion, got {:?}", other),
        }
        assert_eq!(result_rows(&store), 2);
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_word("  CoFFee \n").unwrap(), "coffee");
        assert_eq!(normalize_word("Black Tea").unwrap(), "black tea");
    }

    #[test]
    fn rejects_empty_and_oversized_words() {
        assert!(matches!(
            normalize_word("   "),
            Err(CompetitionError::InvalidInput(_))
        ));
        assert!(normalize_word(&"a".repeat(MAX_WORD_CHARS)).is_ok());
        assert!(matches!(
            normalize_word(&"a".repeat(MAX_WORD_CHARS + 1)),
            Err(CompetitionError::InvalidInput(_))
        ));
    }

    #[test]
    fn length_cap_counts_characters_not_bytes() {
        assert!(normalize_word(&"é".repeat(MAX_WORD_CHARS)).is_ok());
    }
}
