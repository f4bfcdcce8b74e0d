use crate::util::sel;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};

lazy_static! {
    // One of these per watched video, holding the links and the timestamp
    static ref SEL_CONTENT_CELL: Selector = sel("div.content-cell.mdl-typography--body-1");
}

/// All cells in the document that may hold a history entry, in document order.
/// Each call starts over from the top of the tree.
pub fn content_cells(doc: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    doc.select(&SEL_CONTENT_CELL)
}

pub fn count(doc: &Html) -> usize {
    content_cells(doc).count()
}
