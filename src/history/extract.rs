use super::timestamp;
use crate::{
    models::{HistoryEntry, PLATFORM},
    util::{reduce_whitespace, sel},
};
use compact_str::CompactString;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Node, Selector};
use tracing::{trace, warn};

static ATTR_HREF: &str = "href";
static TAG_BR: &str = "br";

lazy_static! {
    static ref SEL_LINK: Selector = sel("a");
    static ref RE_VIDEO_ID: Regex = Regex::new(r"[?&]v=([^&]+)").unwrap();
}

/// Map one content cell to an entry. Returns None only if the cell has no link at all; anything
/// else that is missing or broken just leaves the corresponding field empty.
pub fn extract_entry(cell: &ElementRef) -> Option<HistoryEntry> {
    let mut links = cell.select(&SEL_LINK);

    let video_link = links.next()?;
    let url = video_link.attr(ATTR_HREF).unwrap_or_default().to_string();
    let title = reduce_whitespace(&video_link.text().collect::<String>());
    let video_id = get_video_id(&url);

    let channel_link = links.next();
    let channel_title = channel_link.map(|c| c.text().collect::<String>().trim().to_string());
    let channel_url = channel_link.map(|c| c.attr(ATTR_HREF).unwrap_or_default().to_string());

    let raw_time = match channel_link {
        Some(c) => Some(text_after(&c)),
        None => timestamp::find_fixed(&cell.text().collect::<Vec<_>>().join(" ")),
    };
    let watched_at = match raw_time {
        None => {
            trace!(%url, "No timestamp found");
            None
        }
        Some(raw) => match timestamp::parse(&raw) {
            Ok(v) => Some(v),
            Err(err) => {
                warn!(%err, %url, "Failed to parse timestamp");
                None
            }
        },
    };

    Some(HistoryEntry {
        title,
        url,
        video_id,
        channel_title,
        channel_url,
        watched_at,
        platform: CompactString::const_new(PLATFORM),
    })
}

/// First "v" query parameter in url, up to the next "&"
pub fn get_video_id(url: &str) -> Option<CompactString> {
    RE_VIDEO_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| CompactString::from(m.as_str()))
}

/// Text directly following e, on the same level. Line breaks are skipped, but any other element
/// ends the text.
fn text_after(e: &ElementRef) -> String {
    let mut text = String::new();
    for node in e.next_siblings() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(el) if el.name() == TAG_BR => continue,
            Node::Element(_) => break,
            _ => continue,
        }
    }
    text.trim().to_string()
}
