//! Tokenizer stage: post events to per-word mention signals
//!
//! Splits post text on whitespace and emits one `WordMention` per distinct
//! word per post. Dedup is case-sensitive and scoped to a single call; the
//! tokenizer carries no state across events.

use std::collections::HashSet;

use trendstream_types::{PostEvent, WordMention};

/// Tokenize one post into its distinct word mentions
///
/// Empty tokens (from runs of whitespace) are discarded. First occurrence
/// order is preserved.
pub fn tokenize(event: &PostEvent) -> Vec<WordMention> {
    let mut seen = HashSet::new();
    event
        .text
        .split_whitespace()
        .filter(|word| seen.insert(*word))
        .map(|word| WordMention {
            word: word.to_string(),
            post_id: event.post_id.clone(),
            event_time: event.create_time,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post(text: &str) -> PostEvent {
        PostEvent {
            post_id: "post-1".to_string(),
            author_id: "a1".to_string(),
            create_time: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            text: text.to_string(),
            digg_count: 0,
            comment_count: 0,
            share_count: 0,
            music_id: None,
            music_name: None,
        }
    }

    #[test]
    fn test_tokenize_splits_on_whitespace() {
        let mentions = tokenize(&post("happy new year"));
        let words: Vec<_> = mentions.iter().map(|m| m.word.as_str()).collect();
        assert_eq!(words, vec!["happy", "new", "year"]);
    }

    #[test]
    fn test_tokenize_dedups_repeated_words() {
        let mentions = tokenize(&post("go go go team go"));
        let words: Vec<_> = mentions.iter().map(|m| m.word.as_str()).collect();
        assert_eq!(words, vec!["go", "team"]);
    }

    #[test]
    fn test_tokenize_is_case_sensitive() {
        let mentions = tokenize(&post("Holidays holidays HOLIDAYS"));
        assert_eq!(mentions.len(), 3);
    }

    #[test]
    fn test_tokenize_discards_empty_tokens() {
        let mentions = tokenize(&post("  spaced \t out\n\nwords  "));
        let words: Vec<_> = mentions.iter().map(|m| m.word.as_str()).collect();
        assert_eq!(words, vec!["spaced", "out", "words"]);
    }

    #[test]
    fn test_tokenize_empty_text() {
        assert!(tokenize(&post("")).is_empty());
        assert!(tokenize(&post("   ")).is_empty());
    }

    #[test]
    fn test_mentions_inherit_post_event_time() {
        let event = post("one two");
        let mentions = tokenize(&event);
        assert!(mentions.iter().all(|m| m.event_time == event.create_time));
        assert!(mentions.iter().all(|m| m.post_id == event.post_id));
    }
}
