//! One adapter per upstream wire protocol.

use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;

use crate::types::ProviderId;

pub mod chat_svg;
pub(crate) mod client;
pub mod recraft;
pub mod svgio;

pub use chat_svg::{ChatSvg, ChatVariant};
pub use recraft::{Recraft, parse_size};
pub use svgio::SvgIo;

pub(crate) const DEFAULT_IMAGE_SIZE: u32 = 1024;

static LAST_ID_NANOS: AtomicU64 = AtomicU64::new(0);

/// `<provider>_<nanos>`, strictly increasing within the process even when
/// the wall clock stalls or steps backwards.
pub(crate) fn generate_image_id(provider: ProviderId) -> String {
    let now = u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos()).unwrap_or(0);
    let previous = LAST_ID_NANOS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or(now);
    let nanos = now.max(previous.saturating_add(1));
    format!("{provider}_{nanos}")
}
