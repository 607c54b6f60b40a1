//! Serde models for the Twitter v1.1 REST API (extended tweet mode).

use serde::Deserialize;

/// One timeline entry as returned by `statuses/user_timeline` or
/// `lists/statuses` with `tweet_mode=extended`.
///
/// A retweet or quote carries the wrapped original alongside the outer
/// status; both layers share this shape, hence the boxed self-references.
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id_str: String,
    /// Creation time in the API's fixed textual format,
    /// e.g. `"Wed Oct 10 20:19:24 +0000 2018"`.
    pub created_at: String,
    pub user: User,
    #[serde(default)]
    pub retweeted_status: Option<Box<Status>>,
    #[serde(default)]
    pub quoted_status: Option<Box<Status>>,
    #[serde(default)]
    pub extended_entities: Option<ExtendedEntities>,
}

impl Status {
    /// Media attachments, empty when the tweet has none.
    pub fn media(&self) -> &[MediaEntity] {
        self.extended_entities
            .as_ref()
            .map_or(&[], |e| e.media.as_slice())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub screen_name: String,
}

/// Container for media attachments. Only present on media-bearing tweets,
/// and only complete under `tweet_mode=extended`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedEntities {
    #[serde(default)]
    pub media: Vec<MediaEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaEntity {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Direct URL of the photo (or the video's preview frame).
    pub media_url_https: String,
    /// Present for `video` and `animated_gif` attachments.
    #[serde(default)]
    pub video_info: Option<VideoInfo>,
}

/// Attachment type. Types this tool does not archive still deserialize
/// cleanly so one exotic attachment never poisons a whole page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// One encoding of a video or animated GIF. Streaming playlist variants
/// (e.g. `application/x-mpegURL`) carry no bitrate.
#[derive(Debug, Clone, Deserialize)]
pub struct Variant {
    pub content_type: String,
    #[serde(default)]
    pub bitrate: Option<u64>,
    pub url: String,
}

/// Response of `lists/show`, trimmed to what the archiver needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ListInfo {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHOTO_STATUS: &str = r#"{
        "id_str": "1001",
        "created_at": "Wed Oct 10 20:19:24 +0000 2018",
        "user": { "screen_name": "alice" },
        "extended_entities": {
            "media": [
                { "type": "photo", "media_url_https": "https://pbs.twimg.com/media/abc.jpg" }
            ]
        }
    }"#;

    #[test]
    fn test_deserialize_photo_status() {
        let status: Status = serde_json::from_str(PHOTO_STATUS).unwrap();
        assert_eq!(status.id_str, "1001");
        assert_eq!(status.user.screen_name, "alice");
        assert_eq!(status.media().len(), 1);
        assert_eq!(status.media()[0].kind, MediaKind::Photo);
        assert!(status.retweeted_status.is_none());
        assert!(status.quoted_status.is_none());
    }

    #[test]
    fn test_deserialize_retweet_wraps_original() {
        let json = format!(
            r#"{{
                "id_str": "2002",
                "created_at": "Thu Oct 11 08:00:00 +0000 2018",
                "user": {{ "screen_name": "bob" }},
                "retweeted_status": {}
            }}"#,
            PHOTO_STATUS
        );
        let status: Status = serde_json::from_str(&json).unwrap();
        let inner = status.retweeted_status.as_deref().unwrap();
        assert_eq!(inner.id_str, "1001");
        assert_eq!(inner.user.screen_name, "alice");
        assert!(status.media().is_empty());
    }

    #[test]
    fn test_deserialize_video_variants() {
        let json = r#"{
            "id_str": "3003",
            "created_at": "Fri Oct 12 12:30:00 +0000 2018",
            "user": { "screen_name": "carol" },
            "extended_entities": {
                "media": [{
                    "type": "video",
                    "media_url_https": "https://pbs.twimg.com/ext_tw_video_thumb/3003/img/x.jpg",
                    "video_info": {
                        "variants": [
                            { "content_type": "application/x-mpegURL", "url": "https://video.twimg.com/pl.m3u8" },
                            { "content_type": "video/mp4", "bitrate": 832000, "url": "https://video.twimg.com/lo.mp4" },
                            { "content_type": "video/mp4", "bitrate": 2176000, "url": "https://video.twimg.com/hi.mp4" }
                        ]
                    }
                }]
            }
        }"#;
        let status: Status = serde_json::from_str(json).unwrap();
        let media = &status.media()[0];
        assert_eq!(media.kind, MediaKind::Video);
        let variants = &media.video_info.as_ref().unwrap().variants;
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].bitrate, None);
        assert_eq!(variants[2].bitrate, Some(2_176_000));
    }

    #[test]
    fn test_unknown_media_kind_does_not_fail() {
        let json = r#"{
            "id_str": "4004",
            "created_at": "Sat Oct 13 09:00:00 +0000 2018",
            "user": { "screen_name": "dave" },
            "extended_entities": {
                "media": [{ "type": "360_pano", "media_url_https": "https://pbs.twimg.com/media/p.jpg" }]
            }
        }"#;
        let status: Status = serde_json::from_str(json).unwrap();
        assert_eq!(status.media()[0].kind, MediaKind::Unknown);
    }
}
