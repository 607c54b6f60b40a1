//! Resolution of timeline statuses into archived media files.
//!
//! For each status this module unwraps reposted/quoted content, works out
//! where the attachment belongs on disk and under what name, picks the best
//! media URL, and performs a collision-safe write. It also computes the
//! batch watermark the archiver persists afterwards.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};
use url::Url;

use crate::config::{MediaTypes, SourceOptions};
use crate::download::Downloader;
use crate::metadata::Watermark;
use crate::twitter::types::{MediaEntity, MediaKind, Status, Variant};

/// `created_at` format used by the v1.1 API,
/// e.g. `"Wed Oct 10 20:19:24 +0000 2018"`.
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Subdirectory of the base output directory holding repost media, unless
/// overridden by `paths.retweets`.
const REPOST_SUBDIR: &str = "retweets";
/// Append-only log of saved repost media inside the repost directory.
const REPOST_LOG_FILE: &str = "_retweets.txt";
/// Suffix requesting the original-size rendition of a photo.
const PHOTO_ORIG_SUFFIX: &str = ":orig";
/// Container extension for videos and animated GIFs.
const VIDEO_EXTENSION: &str = ".mp4";
const VIDEO_MIME: &str = "video/mp4";
/// Extension suffix marking dry-run placeholder files.
const DRY_RUN_SUFFIX: &str = "_blank";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Original,
    Repost,
    Quote,
}

/// A status resolved to the content that actually gets archived.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveContent<'a> {
    pub kind: ContentKind,
    /// The wrapped original for reposts and quotes, the status itself
    /// otherwise.
    pub content: &'a Status,
}

impl EffectiveContent<'_> {
    /// Reposts and quotes both archive into the repost directory.
    pub fn is_repost(&self) -> bool {
        !matches!(self.kind, ContentKind::Original)
    }

    /// Creation time of the effective content.
    ///
    /// # Errors
    ///
    /// Returns an error if `created_at` is not in the API's fixed format.
    pub fn timestamp(&self) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
        parse_created_at(&self.content.created_at)
    }
}

/// Resolve a status to its effective content. Used both for watermark
/// filtering during pagination and for placement during saving.
pub fn canonicalize(status: &Status) -> EffectiveContent<'_> {
    if let Some(inner) = &status.retweeted_status {
        EffectiveContent {
            kind: ContentKind::Repost,
            content: inner,
        }
    } else if let Some(inner) = &status.quoted_status {
        EffectiveContent {
            kind: ContentKind::Quote,
            content: inner,
        }
    } else {
        EffectiveContent {
            kind: ContentKind::Original,
            content: status,
        }
    }
}

/// Parse a `created_at` value from the API's fixed textual format.
///
/// # Errors
///
/// Returns an error if `raw` does not match the format.
pub fn parse_created_at(raw: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_str(raw, CREATED_AT_FORMAT)
}

/// Everything `resolve_and_save` needs besides the batch itself.
pub struct SaveContext<'a> {
    pub downloader: &'a dyn Downloader,
    /// Display name of the source; becomes the default output folder.
    pub folder_name: &'a str,
    pub options: &'a SourceOptions,
}

/// Save every qualifying attachment in `statuses` and return the newest
/// effective watermark observed among media-bearing items, or `None` when
/// nothing in the batch qualifies.
///
/// Individual download and filesystem failures are logged and skipped;
/// they never abort the rest of the batch.
pub async fn resolve_and_save(statuses: &[Status], ctx: &SaveContext<'_>) -> Option<Watermark> {
    let base_dir = ctx.options.paths.output.clone().unwrap_or_else(|| {
        PathBuf::from("out").join(sanitize_dir_name(ctx.folder_name))
    });
    let repost_dir = ctx
        .options
        .paths
        .retweets
        .clone()
        .unwrap_or_else(|| base_dir.join(REPOST_SUBDIR));

    let mut newest: Option<Watermark> = None;
    let mut repost_log = String::new();

    for status in statuses {
        let effective = canonicalize(status);
        let tweet = effective.content;

        if tweet.media().is_empty() {
            continue;
        }

        let timestamp = match effective.timestamp() {
            Ok(ts) => ts,
            Err(e) => {
                warn!(id = %tweet.id_str, error = %e, "Skipping status with unparseable created_at");
                continue;
            }
        };

        // Media-bearing content drives the watermark; on equal timestamps
        // the later-processed item wins.
        if newest
            .as_ref()
            .map_or(true, |w| timestamp >= w.last_seen_timestamp)
        {
            newest = Some(Watermark {
                last_seen_id: tweet.id_str.clone(),
                last_seen_timestamp: timestamp,
            });
        }

        let date = timestamp.format("%Y-%m-%d").to_string();

        for (index, media) in tweet.media().iter().enumerate() {
            if !allowed(&ctx.options.media_types, media.kind) {
                continue;
            }

            let Some((mut extension, url)) = resolve_attachment(media) else {
                warn!(id = %tweet.id_str, index, "Attachment has no usable variant, skipping");
                continue;
            };
            if ctx.options.dry_run {
                extension.push_str(DRY_RUN_SUFFIX);
            }

            let file_name = format!(
                "{}{extension}",
                file_name_base(&tweet.user.screen_name, &date, &tweet.id_str, index)
            );

            let dir = if effective.is_repost() {
                &repost_dir
            } else {
                &base_dir
            };
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(dir = %dir.display(), error = %e, "Failed to create output directory");
                continue;
            }

            // The same content can surface twice, as an original and as a
            // repost. Both candidate locations are checked so the
            // first-written copy wins regardless of which form showed up
            // first.
            let base_destination = base_dir.join(&file_name);
            let repost_destination = repost_dir.join(&file_name);
            if path_exists(&base_destination).await || path_exists(&repost_destination).await {
                debug!(file = %file_name, "Already archived, skipping");
                continue;
            }
            let destination = dir.join(&file_name);

            let saved = if ctx.options.dry_run {
                tokio::fs::write(&destination, b"")
                    .await
                    .map_err(anyhow::Error::from)
            } else {
                ctx.downloader.stream_to_file(&url, &destination).await
            };

            match saved {
                Ok(()) => {
                    debug!(file = %file_name, repost = effective.is_repost(), "Saved attachment");
                    if effective.is_repost() {
                        repost_log
                            .push_str(&format!("{} : {file_name}\n", status.user.screen_name));
                    }
                }
                Err(e) => {
                    warn!(file = %file_name, url = %url, "Failed to save attachment: {e:#}");
                }
            }
        }
    }

    if ctx.options.log_retweets && !repost_log.is_empty() && path_exists(&repost_dir).await {
        if let Err(e) = append_repost_log(&repost_dir, &repost_log).await {
            warn!(dir = %repost_dir.display(), "Failed to append repost log: {e:#}");
        }
    }

    newest
}

fn allowed(types: &MediaTypes, kind: MediaKind) -> bool {
    match kind {
        MediaKind::Photo => types.photo,
        MediaKind::Video => types.video,
        MediaKind::AnimatedGif => types.animated_gif,
        MediaKind::Unknown => false,
    }
}

/// Work out the extension and source URL for one attachment. Returns `None`
/// for a video attachment with no variants at all.
fn resolve_attachment(media: &MediaEntity) -> Option<(String, String)> {
    match media.kind {
        MediaKind::Photo => Some((
            photo_extension(&media.media_url_https),
            format!("{}{PHOTO_ORIG_SUFFIX}", media.media_url_https),
        )),
        MediaKind::Video | MediaKind::AnimatedGif => {
            let variants = media
                .video_info
                .as_ref()
                .map_or(&[][..], |info| info.variants.as_slice());
            let best = best_variant(variants)?;
            Some((VIDEO_EXTENSION.to_string(), best.url.clone()))
        }
        MediaKind::Unknown => None,
    }
}

/// Highest-bitrate MP4 variant, or the first variant when no MP4 exists.
fn best_variant(variants: &[Variant]) -> Option<&Variant> {
    variants
        .iter()
        .filter(|v| v.content_type == VIDEO_MIME)
        .max_by_key(|v| v.bitrate.unwrap_or(0))
        .or_else(|| variants.first())
}

/// Extension (with leading dot) taken from the media URL's path, empty when
/// the path has none.
fn photo_extension(media_url: &str) -> String {
    let path = Url::parse(media_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| media_url.to_string());
    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map_or_else(String::new, |ext| format!(".{ext}"))
}

fn file_name_base(screen_name: &str, date: &str, id: &str, index: usize) -> String {
    format!("{screen_name}_{date}_{id}_{}", index + 1)
}

/// Sanitize a display name for use as a directory component.
///
/// Replaces spaces and path-hostile characters with underscores and
/// collapses runs of them. List names come from the API and are not under
/// the operator's control.
pub fn sanitize_dir_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '#' | '?' | '&' | '%' | '"' | '\'' | '<' | '>' | '|' | '*' | ':' | '\\' | '/' => '_',
            '(' | ')' | '[' | ']' | '-' | '_' | '.' => c,
            c if c.is_alphanumeric() => c,
            _ => '_',
        })
        .collect();

    let collapsed = mapped
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    if collapsed.is_empty() {
        "_".to_string()
    } else {
        collapsed
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn append_repost_log(repost_dir: &Path, entries: &str) -> anyhow::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(repost_dir.join(REPOST_LOG_FILE))
        .await?;
    file.write_all(entries.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
