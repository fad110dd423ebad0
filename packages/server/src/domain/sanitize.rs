//! Content sanitizers applied to every message.
//!
//! Both passes are pure text transforms with no failure mode.

use emojis::Emoji;

/// Lowercase ASCII terms that get masked wherever they appear inside a word.
const PROFANE_TERMS: &[&str] = &[
    "asshole", "bastard", "bitch", "bollocks", "cunt", "dick", "dildo", "fuck", "jizz",
    "motherfucker", "piss", "shit", "slut", "twat", "wanker", "whore",
];

/// Words that contain a profane term but are not profane themselves.
const FALSE_POSITIVES: &[&str] = &[
    "dickens",
    "dickinson",
    "scunthorpe",
    "shitake",
    "shiitake",
    "pissarro",
];

const MASK: char = '*';

/// Replace `:shortcode:` sequences with their emoji. Unknown shortcodes pass through.
pub fn expand_shortcodes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(':') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        if let Some((end, emoji)) = after
            .find(':')
            .and_then(|end| lookup_shortcode(&after[..end]).map(|emoji| (end, emoji)))
        {
            out.push_str(emoji.as_str());
            rest = &after[end + 1..];
            continue;
        }

        // the colon may still open a later shortcode
        out.push(':');
        rest = after;
    }

    out.push_str(rest);
    out
}

fn lookup_shortcode(candidate: &str) -> Option<&'static Emoji> {
    let valid = !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'));
    if !valid {
        return None;
    }
    emojis::get_by_shortcode(candidate)
}

/// Mask profane terms case-insensitively with an equal-length run of `*`.
///
/// Matching runs on a normalized view of each whitespace-delimited chunk:
/// leetspeak is folded to letters (`sh1t`, `a$$hole`), other punctuation is
/// skipped (`f.u.c.k`) and a repeated letter matches a single one
/// (`fuuuck`). Masks are mapped back onto the original characters, so
/// skipped punctuation inside a match is masked too.
pub fn mask_profanity(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut start = 0;

    while start < chars.len() {
        if chars[start].is_whitespace() {
            start += 1;
            continue;
        }
        let end = chars[start..]
            .iter()
            .position(|c| c.is_whitespace())
            .map_or(chars.len(), |len| start + len);
        mask_chunk(&mut chars[start..end]);
        start = end;
    }

    chars.into_iter().collect()
}

/// A run of one repeated normalized character and the chunk positions it spans.
#[derive(Debug)]
struct Run {
    ch: char,
    len: usize,
    first: usize,
    last: usize,
}

/// Fold a character to the letter it stands for; `None` for skipped punctuation.
fn normalize(c: char) -> Option<char> {
    let folded = match c {
        '0' => 'o',
        '1' | '!' | '|' => 'i',
        '3' => 'e',
        '4' | '@' => 'a',
        '5' | '$' => 's',
        '7' => 't',
        '8' => 'b',
        c if c.is_alphanumeric() => c.to_ascii_lowercase(),
        _ => return None,
    };
    Some(folded)
}

/// The normalized chunk as a string, and as runs of repeated characters
fn runs(chunk: &[char]) -> (String, Vec<Run>) {
    let mut flat = String::new();
    let mut runs: Vec<Run> = Vec::new();

    for (i, ch) in chunk
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| normalize(c).map(|ch| (i, ch)))
    {
        flat.push(ch);
        match runs.last_mut() {
            Some(run) if run.ch == ch => {
                run.len += 1;
                run.last = i;
            }
            _ => runs.push(Run {
                ch,
                len: 1,
                first: i,
                last: i,
            }),
        }
    }

    (flat, runs)
}

/// `(char, repeat count)` pairs of a term, e.g. `piss` → p1 i1 s2
fn term_runs(term: &str) -> Vec<(char, usize)> {
    let mut pattern: Vec<(char, usize)> = Vec::new();
    for ch in term.chars() {
        match pattern.last_mut() {
            Some((last, count)) if *last == ch => *count += 1,
            _ => pattern.push((ch, 1)),
        }
    }
    pattern
}

fn mask_chunk(chunk: &mut [char]) {
    let (flat, runs) = runs(chunk);
    if runs.is_empty() || FALSE_POSITIVES.iter().any(|fp| flat.starts_with(fp)) {
        return;
    }

    let mut hide = vec![false; chunk.len()];
    for term in PROFANE_TERMS {
        let pattern = term_runs(term);
        if pattern.len() > runs.len() {
            continue;
        }
        // a run in the text must repeat at least as often as in the term
        for window in runs.windows(pattern.len()) {
            let matched = window
                .iter()
                .zip(&pattern)
                .all(|(run, &(ch, count))| run.ch == ch && run.len >= count);
            if matched {
                hide[window[0].first..=window[window.len() - 1].last].fill(true);
            }
        }
    }

    for (c, hidden) in chunk.iter_mut().zip(hide) {
        if hidden {
            *c = MASK;
        }
    }
}
