//! Cursor-based timeline pagination.

use tracing::{debug, warn};

use crate::media::canonicalize;
use crate::metadata::Watermark;
use crate::twitter::{ApiError, TimelineApi, TimelineQuery};
use crate::twitter::types::Status;

/// Fetch every status newer than `watermark`, newest first.
///
/// Walks the timeline backward with a `max_id` cursor until the API returns
/// an empty page or repeats the cursor (some deployments hand back the same
/// final page forever instead of an empty one). A page shorter than the
/// requested count does not by itself mean the timeline is exhausted.
///
/// The API's `since_id` filter is not trusted: it is known to return items
/// strictly older than the watermark, so the accumulated batch is
/// re-filtered against the watermark timestamp afterwards. Passing
/// `watermark = None` disables both the `since_id` parameter and the
/// post-filter.
///
/// # Errors
///
/// Returns the first `ApiError` encountered; a partial walk is never
/// handed to the caller.
pub async fn fetch_all_new(
    api: &dyn TimelineApi,
    query: &TimelineQuery,
    watermark: Option<&Watermark>,
) -> Result<Vec<Status>, ApiError> {
    let since_id = watermark.map(|w| w.last_seen_id.as_str());
    let mut max_id: Option<String> = None;
    let mut statuses = Vec::new();

    loop {
        let page = api.fetch_page(query, since_id, max_id.as_deref()).await?;

        let Some(last) = page.last() else {
            break;
        };
        if max_id.as_deref() == Some(last.id_str.as_str()) {
            // Static page: the cursor did not move, so treat the timeline
            // as exhausted without appending the repeat.
            debug!(max_id = %last.id_str, "Cursor repeated, stopping pagination");
            break;
        }

        max_id = Some(last.id_str.clone());
        debug!(page_len = page.len(), cursor = ?max_id, "Accumulated timeline page");
        statuses.extend(page);
    }

    if let Some(watermark) = watermark {
        let before = statuses.len();
        statuses.retain(|status| match canonicalize(status).timestamp() {
            Ok(ts) => ts >= watermark.last_seen_timestamp,
            Err(e) => {
                warn!(id = %status.id_str, error = %e, "Dropping status with unparseable created_at");
                false
            }
        });
        let dropped = before - statuses.len();
        if dropped > 0 {
            debug!(dropped, "Post-filtered statuses older than the watermark");
        }
    }

    Ok(statuses)
}
