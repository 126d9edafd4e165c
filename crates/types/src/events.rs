//! Input event types
//!
//! Raw wire schema for incoming post messages plus the decoded, validated
//! event form that the rest of the pipeline consumes. The wire schema is a
//! projection of the source payload: only the fields the pipeline reads are
//! declared, everything else is ignored during deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author block of the raw post payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAuthorInfos {
    #[serde(rename = "uniqueId")]
    pub unique_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Item block of the raw post payload
///
/// `createTime` arrives as an epoch-seconds string, not a number; the
/// decoder coerces it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawItemInfos {
    pub id: Option<String>,
    #[serde(rename = "createTime")]
    pub create_time: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "commentCount")]
    pub comment_count: Option<u64>,
    #[serde(rename = "diggCount")]
    pub digg_count: Option<u64>,
    #[serde(rename = "shareCount")]
    pub share_count: Option<u64>,
}

/// Music block of the raw post payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMusicInfos {
    #[serde(rename = "musicId")]
    pub music_id: Option<String>,
    #[serde(rename = "musicName")]
    pub music_name: Option<String>,
    #[serde(rename = "authorName")]
    pub author_name: Option<String>,
}

/// Raw post message as read off the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPost {
    #[serde(rename = "authorInfos")]
    pub author_infos: Option<RawAuthorInfos>,
    #[serde(rename = "itemInfos")]
    pub item_infos: Option<RawItemInfos>,
    #[serde(rename = "musicInfos")]
    pub music_infos: Option<RawMusicInfos>,
}

/// A decoded, validated post event
///
/// Immutable once decoded. `create_time` carries event-time semantics at
/// seconds resolution; all windowing downstream is based on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEvent {
    /// Unique post identifier
    pub post_id: String,
    /// Author identifier (empty when the payload omits it)
    pub author_id: String,
    /// Event-time timestamp of the post
    pub create_time: DateTime<Utc>,
    /// Raw post text
    pub text: String,
    /// Like count
    pub digg_count: u64,
    /// Comment count
    pub comment_count: u64,
    /// Share count
    pub share_count: u64,
    /// Attached music track id, if any
    pub music_id: Option<String>,
    /// Attached music track name, if any
    pub music_name: Option<String>,
}

impl PostEvent {
    /// Combined engagement metric (likes + comments + shares)
    pub fn engagement_count(&self) -> u64 {
        self.digg_count + self.comment_count + self.share_count
    }
}

/// A single word mentioned by a single post
///
/// Invariant: at most one `WordMention` exists per `(word, post_id)` pair;
/// repeated words within one post collapse during tokenization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordMention {
    /// The mentioned word, case preserved
    pub word: String,
    /// Post the mention came from
    pub post_id: String,
    /// Event time inherited from the post
    pub event_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_raw_post_ignores_unknown_fields() {
        let json = r#"{
            "authorInfos": {"uniqueId": "user1", "userId": "42", "nickName": "ignored"},
            "itemInfos": {"id": "p1", "createTime": "1600000000", "text": "hello", "covers": []},
            "challengeInfoList": [{"challengeId": "c1"}]
        }"#;

        let raw: RawPost = serde_json::from_str(json).unwrap();
        assert_eq!(raw.author_infos.unwrap().unique_id.as_deref(), Some("user1"));
        let item = raw.item_infos.unwrap();
        assert_eq!(item.id.as_deref(), Some("p1"));
        assert_eq!(item.create_time.as_deref(), Some("1600000000"));
    }

    #[test]
    fn test_engagement_count() {
        let event = PostEvent {
            post_id: "p1".to_string(),
            author_id: "a1".to_string(),
            create_time: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            text: "hello".to_string(),
            digg_count: 10,
            comment_count: 3,
            share_count: 2,
            music_id: None,
            music_name: None,
        };

        assert_eq!(event.engagement_count(), 15);
    }

    #[test]
    fn test_word_mention_roundtrip() {
        let mention = WordMention {
            word: "Holidays".to_string(),
            post_id: "p1".to_string(),
            event_time: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
        };

        let json = serde_json::to_string(&mention).unwrap();
        let back: WordMention = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mention);
    }
}
