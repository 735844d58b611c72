use common::utils::text::floor_char_boundary;

/// How far back from the target cut we look for a structural boundary before
/// giving up and cutting mid-word.
const SNAP_TOLERANCE: usize = 400;

/// One page of cleaned text, 1-based numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Byte range a page occupies in the assembled document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub number: u32,
    pub start: usize,
    pub end: usize,
}

/// Output of the chunker: an exact window into the assembled text plus the
/// metadata retrieval needs later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPayload {
    pub ordinal: usize,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub section_path: Vec<String>,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Joins pages into one document string with a blank-line separator, tracking
/// the byte range each page covers.
pub fn assemble_pages(pages: &[PageText]) -> (String, Vec<PageRange>) {
    let mut full_text = String::new();
    let mut ranges = Vec::with_capacity(pages.len());
    for page in pages {
        if page.text.is_empty() {
            continue;
        }
        if !full_text.is_empty() {
            full_text.push_str("\n\n");
        }
        let start = full_text.len();
        full_text.push_str(&page.text);
        ranges.push(PageRange {
            number: page.number,
            start,
            end: full_text.len(),
        });
    }
    (full_text, ranges)
}

/// Min/max page numbers overlapping `[start, end)`.
pub fn page_span(ranges: &[PageRange], start: usize, end: usize) -> (Option<u32>, Option<u32>) {
    let mut first = None;
    let mut last = None;
    for range in ranges {
        if range.start < end && range.end > start {
            if first.is_none() {
                first = Some(range.number);
            }
            last = Some(range.number);
        }
    }
    (first, last)
}

/// Walks markdown-style headings (`#` to `######`) and records the heading
/// stack in effect from each heading line onward.
pub fn build_section_map(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut snapshots: Vec<(usize, Vec<String>)> = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if let Some((level, title)) = parse_heading(trimmed) {
            while stack.last().is_some_and(|(l, _)| *l >= level) {
                stack.pop();
            }
            stack.push((level, title));
            snapshots.push((
                offset,
                stack.iter().map(|(_, title)| title.clone()).collect(),
            ));
        }
        offset += line.len();
    }
    snapshots
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = line[hashes..].strip_prefix(' ')?;
    let title = rest.trim();
    if title.is_empty() {
        None
    } else {
        Some((hashes, title.to_string()))
    }
}

/// Heading stack active at a byte offset: the latest snapshot at or before it.
pub fn section_path_at(map: &[(usize, Vec<String>)], offset: usize) -> Vec<String> {
    map.iter()
        .take_while(|(at, _)| *at <= offset)
        .last()
        .map(|(_, path)| path.clone())
        .unwrap_or_default()
}

/// Sliding-window chunker. Windows are `target` bytes with `overlap` bytes of
/// overlap; the cut snaps to the nearest paragraph, sentence, or word boundary
/// within `SNAP_TOLERANCE`, falling back to a hard cut. Chunk text is the
/// exact substring of the assembled document, so offsets always satisfy
/// `text[char_start..char_end] == chunk.text`.
pub fn chunk_document(pages: &[PageText], target: usize, overlap: usize) -> Vec<ChunkPayload> {
    let (full_text, ranges) = assemble_pages(pages);
    if full_text.is_empty() || target == 0 {
        return Vec::new();
    }
    let section_map = build_section_map(&full_text);
    let overlap = overlap.min(target.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut ordinal = 0usize;
    let text_len = full_text.len();

    while start < text_len {
        let mut end = floor_char_boundary(&full_text, (start + target).min(text_len));
        if end < text_len {
            end = snap_cut(&full_text, start, end);
        }
        if end <= start {
            break;
        }

        let (page_start, page_end) = page_span(&ranges, start, end);
        chunks.push(ChunkPayload {
            ordinal,
            page_start,
            page_end,
            section_path: section_path_at(&section_map, start),
            text: full_text[start..end].to_string(),
            char_start: start,
            char_end: end,
        });
        ordinal += 1;

        if end >= text_len {
            break;
        }
        let mut next_start = floor_char_boundary(&full_text, end.saturating_sub(overlap));
        if next_start <= start {
            next_start = end;
        }
        start = next_start;
    }

    chunks
}

/// Snaps a window end to the best structural boundary at or before it:
/// paragraph break first, then sentence end, then word boundary.
fn snap_cut(text: &str, start: usize, end: usize) -> usize {
    let window_start = floor_char_boundary(text, end.saturating_sub(SNAP_TOLERANCE).max(start + 1));
    let window = &text[window_start..end];

    if let Some(pos) = window.rfind("\n\n") {
        return window_start + pos + 2;
    }

    let sentence_cut = [". ", "! ", "? ", "\n"]
        .iter()
        .filter_map(|pat| window.rfind(pat).map(|pos| pos + pat.len()))
        .max();
    if let Some(pos) = sentence_cut {
        return window_start + pos;
    }

    if let Some(pos) = window.rfind(' ') {
        return window_start + pos + 1;
    }

    floor_char_boundary(text, end)
}
