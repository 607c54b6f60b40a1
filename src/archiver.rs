//! Per-source archive pipeline: fetch new statuses, save their media,
//! report the source's updated state.

use anyhow::{Context, Result};
use tracing::info;

use crate::config::SourceOptions;
use crate::download::Downloader;
use crate::media::{self, SaveContext};
use crate::metadata::SourceState;
use crate::timeline;
use crate::twitter::{TimelineApi, TimelineEndpoint, TimelineQuery};

/// Page size for user timelines.
const USER_PAGE_SIZE: u32 = 200;
/// Page size for list timelines.
const LIST_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone)]
pub enum SourceKind {
    User { screen_name: String },
    List { list_id: String },
}

/// One account or list to archive, as declared in the configuration.
#[derive(Debug, Clone)]
pub struct Source {
    pub kind: SourceKind,
    pub options: SourceOptions,
}

impl Source {
    pub fn user(screen_name: impl Into<String>, options: SourceOptions) -> Self {
        Self {
            kind: SourceKind::User {
                screen_name: screen_name.into(),
            },
            options,
        }
    }

    pub fn list(list_id: impl Into<String>, options: SourceOptions) -> Self {
        Self {
            kind: SourceKind::List {
                list_id: list_id.into(),
            },
            options,
        }
    }

    /// Short human-readable identifier for log lines.
    pub fn describe(&self) -> String {
        match &self.kind {
            SourceKind::User { screen_name } => format!("user {screen_name}"),
            SourceKind::List { list_id } => format!("list {list_id}"),
        }
    }
}

fn timeline_query(source: &Source) -> TimelineQuery {
    let (endpoint, count) = match &source.kind {
        SourceKind::User { screen_name } => (
            TimelineEndpoint::UserTimeline {
                screen_name: screen_name.clone(),
            },
            USER_PAGE_SIZE,
        ),
        SourceKind::List { list_id } => (
            TimelineEndpoint::ListStatuses {
                list_id: list_id.clone(),
            },
            LIST_PAGE_SIZE,
        ),
    };
    TimelineQuery {
        endpoint,
        count,
        include_retweets: source.options.retweets,
        include_replies: source.options.replies,
    }
}

/// Run one source's complete fetch-then-save pipeline and return its
/// updated state for the driver to merge into the metadata store.
///
/// # Errors
///
/// Returns an error when the source cannot be processed at all (an
/// unresolvable list or a failed timeline fetch). Per-attachment failures
/// are handled (and logged) inside the resolver and do not surface here.
pub async fn archive_source(
    api: &dyn TimelineApi,
    downloader: &dyn Downloader,
    source: &Source,
    mut state: SourceState,
) -> Result<SourceState> {
    // Lists resolve their display name once; it sticks in metadata.
    if let SourceKind::List { list_id } = &source.kind {
        if state.name.is_none() {
            let list = api
                .fetch_list_info(list_id)
                .await
                .with_context(|| format!("Failed to resolve metadata for list {list_id}"))?;
            state.name = Some(list.name);
        }
    }

    let folder_name = match &source.kind {
        SourceKind::User { screen_name } => screen_name.clone(),
        SourceKind::List { list_id } => state
            .name
            .clone()
            .unwrap_or_else(|| list_id.clone()),
    };

    let query = timeline_query(source);
    let watermark = if source.options.ignore_latest_tweet_id {
        None
    } else {
        state.watermark.as_ref()
    };

    let statuses = timeline::fetch_all_new(api, &query, watermark)
        .await
        .with_context(|| format!("Failed to fetch timeline for {}", source.describe()))?;

    info!(count = statuses.len(), source = %source.describe(), "Fetched new statuses");

    let ctx = SaveContext {
        downloader,
        folder_name: &folder_name,
        options: &source.options,
    };
    if let Some(watermark) = media::resolve_and_save(&statuses, &ctx).await {
        state.watermark = Some(watermark);
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_query_for_user() {
        let mut options = SourceOptions::default();
        options.retweets = false;
        options.replies = false;
        let source = Source::user("alice", options);

        let query = timeline_query(&source);
        assert_eq!(query.count, 200);
        assert!(!query.include_retweets);
        assert!(!query.include_replies);
        assert!(matches!(
            query.endpoint,
            TimelineEndpoint::UserTimeline { ref screen_name } if screen_name == "alice"
        ));
    }

    #[test]
    fn test_timeline_query_for_list() {
        let source = Source::list("42", SourceOptions::default());

        let query = timeline_query(&source);
        assert_eq!(query.count, 1000);
        assert!(query.include_retweets);
        assert!(matches!(
            query.endpoint,
            TimelineEndpoint::ListStatuses { ref list_id } if list_id == "42"
        ));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            Source::user("alice", SourceOptions::default()).describe(),
            "user alice"
        );
        assert_eq!(
            Source::list("42", SourceOptions::default()).describe(),
            "list 42"
        );
    }
}
