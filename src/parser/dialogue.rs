use std::sync::LazyLock;

use regex::Regex;

/// Two ASCII capitals and a colon: interviewer/interviewee initials.
static SPEAKER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]{2}:").unwrap());

/// Split flattened text into speaker turns.
///
/// A turn starts at a speaker tag and runs up to the next tag that starts at
/// least one byte past its own colon, or to end of text. Text before the
/// first tag is dropped. Tags may overlap preceding capitals, so `"ABC:"`
/// starts a turn at `"BC:"`. A single trailing newline counts as end of text.
pub fn speaker_turns(text: &str) -> Vec<&str> {
    let end_of_text = match text.strip_suffix('\n') {
        Some(head) => head.len(),
        None => text.len(),
    };

    let mut turns = Vec::new();
    let mut pos = 0;

    while let Some(tag) = SPEAKER_TAG.find_at(text, pos) {
        let start = tag.start();

        // Leftmost match at or after the colon; this also catches tags
        // overlapping a run of capitals.
        let end = SPEAKER_TAG
            .find_at(text, tag.end())
            .map_or(end_of_text, |next| next.start());

        turns.push(&text[start..end]);
        if end >= end_of_text {
            break;
        }
        pos = end;
    }

    turns
}

/// Concatenate turns in document order.
pub fn join_turns(turns: &[&str]) -> String {
    turns.join(" ")
}
