//! Decoder stage: raw message bytes to validated post events
//!
//! The decoder projects the nested wire payload down to the fields the
//! pipeline reads, validates the required ones (`itemInfos.id`,
//! `itemInfos.createTime`, `itemInfos.text`) and coerces `createTime` from
//! an epoch-seconds string to a timestamp. A bad record is never fatal:
//! the caller drops it and the per-kind dead-letter counters record why.

use chrono::{DateTime, TimeZone, Utc};
use trendstream_types::{PostEvent, RawPost};

use crate::error::{DecodeError, DecodeResult};

/// Per-kind dead-letter counters for the decoder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderMetrics {
    /// Records decoded successfully
    pub decoded: u64,
    /// Records dropped because the payload was not valid JSON
    pub malformed_json: u64,
    /// Records dropped because a required field was absent
    pub missing_field: u64,
    /// Records dropped because a field had the wrong shape
    pub type_mismatch: u64,
}

impl DecoderMetrics {
    /// Total records set aside as dead letters
    pub fn dead_letters(&self) -> u64 {
        self.malformed_json + self.missing_field + self.type_mismatch
    }

    fn record(&mut self, err: &DecodeError) {
        match err {
            DecodeError::MalformedJson(_) => self.malformed_json += 1,
            DecodeError::MissingField { .. } => self.missing_field += 1,
            DecodeError::TypeMismatch { .. } => self.type_mismatch += 1,
        }
    }
}

/// Decoder for raw post messages
#[derive(Debug, Default)]
pub struct Decoder {
    metrics: DecoderMetrics,
}

impl Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one raw message, tracking dead letters
    pub fn decode(&mut self, raw: &[u8]) -> DecodeResult<PostEvent> {
        match decode(raw) {
            Ok(event) => {
                self.metrics.decoded += 1;
                Ok(event)
            }
            Err(err) => {
                self.metrics.record(&err);
                Err(err)
            }
        }
    }

    /// Snapshot of the decoder counters
    pub fn metrics(&self) -> &DecoderMetrics {
        &self.metrics
    }
}

/// Decode one raw message into a validated `PostEvent`
pub fn decode(raw: &[u8]) -> DecodeResult<PostEvent> {
    let post: RawPost = serde_json::from_slice(raw)
        .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;

    let item = post
        .item_infos
        .ok_or(DecodeError::MissingField { field: "itemInfos" })?;

    let post_id = item
        .id
        .ok_or(DecodeError::MissingField { field: "itemInfos.id" })?;
    let create_time_raw = item.create_time.ok_or(DecodeError::MissingField {
        field: "itemInfos.createTime",
    })?;
    let text = item
        .text
        .ok_or(DecodeError::MissingField { field: "itemInfos.text" })?;

    let create_time = parse_epoch_seconds(&create_time_raw)?;

    let author_id = post
        .author_infos
        .and_then(|a| a.user_id.or(a.unique_id))
        .unwrap_or_default();

    let (music_id, music_name) = match post.music_infos {
        Some(music) => (music.music_id, music.music_name),
        None => (None, None),
    };

    Ok(PostEvent {
        post_id,
        author_id,
        create_time,
        text,
        digg_count: item.digg_count.unwrap_or(0),
        comment_count: item.comment_count.unwrap_or(0),
        share_count: item.share_count.unwrap_or(0),
        music_id,
        music_name,
    })
}

/// Coerce an epoch-seconds string to a UTC timestamp
fn parse_epoch_seconds(raw: &str) -> DecodeResult<DateTime<Utc>> {
    let secs: i64 = raw.trim().parse().map_err(|_| DecodeError::TypeMismatch {
        field: "itemInfos.createTime",
        reason: format!("expected epoch-seconds string, got '{}'", raw),
    })?;

    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| DecodeError::TypeMismatch {
            field: "itemInfos.createTime",
            reason: format!("epoch seconds out of range: {}", secs),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_payload() -> String {
        r#"{
            "authorInfos": {"uniqueId": "trendsetter", "userId": "u42"},
            "itemInfos": {
                "id": "post-1",
                "createTime": "1600000000",
                "text": "Happy Holidays everyone",
                "commentCount": 4,
                "diggCount": 10,
                "shareCount": 1
            },
            "musicInfos": {"musicId": "m7", "musicName": "Jingle", "authorName": "Band"}
        }"#
        .to_string()
    }

    #[test]
    fn test_decode_valid_record() {
        let event = decode(valid_payload().as_bytes()).unwrap();

        assert_eq!(event.post_id, "post-1");
        assert_eq!(event.author_id, "u42");
        assert_eq!(event.create_time.timestamp(), 1_600_000_000);
        assert_eq!(event.text, "Happy Holidays everyone");
        assert_eq!(event.engagement_count(), 15);
        assert_eq!(event.music_name.as_deref(), Some("Jingle"));
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode(b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedJson(_)));
    }

    #[test]
    fn test_decode_missing_post_id() {
        let payload = r#"{"itemInfos": {"createTime": "1600000000", "text": "hi"}}"#;
        let err = decode(payload.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingField { field: "itemInfos.id" }
        ));
    }

    #[test]
    fn test_decode_missing_item_infos() {
        let payload = r#"{"authorInfos": {"uniqueId": "x"}}"#;
        let err = decode(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "itemInfos" }));
    }

    #[test]
    fn test_decode_non_numeric_create_time() {
        let payload = r#"{"itemInfos": {"id": "p", "createTime": "yesterday", "text": "hi"}}"#;
        let err = decode(payload.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TypeMismatch { field: "itemInfos.createTime", .. }
        ));
    }

    #[test]
    fn test_decode_counts_omitted_default_to_zero() {
        let payload = r#"{"itemInfos": {"id": "p", "createTime": "1600000000", "text": "hi"}}"#;
        let event = decode(payload.as_bytes()).unwrap();
        assert_eq!(event.engagement_count(), 0);
    }

    #[test]
    fn test_decoder_dead_letter_counters() {
        let mut decoder = Decoder::new();

        decoder.decode(valid_payload().as_bytes()).unwrap();
        decoder.decode(b"garbage").unwrap_err();
        decoder
            .decode(br#"{"itemInfos": {"id": "p", "text": "hi"}}"#)
            .unwrap_err();

        let metrics = decoder.metrics();
        assert_eq!(metrics.decoded, 1);
        assert_eq!(metrics.malformed_json, 1);
        assert_eq!(metrics.missing_field, 1);
        assert_eq!(metrics.dead_letters(), 2);
    }
}
