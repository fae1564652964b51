//! Length-aware splitting of normalized bodies
//!
//! Bodies that fit the destination's hard limit go out as a single chunk.
//! Longer bodies are either split at word boundaries into a thread, or cut
//! once and finished with an ellipsis and a link back to the original post.

use tracing::debug;

use crate::text::length::{contains_url, estimate};

/// Words longer than this may be broken across chunks
const BREAKABLE_WORD_LEN: usize = 30;

/// Minimum room left in a chunk before a long word is worth breaking into it
const MIN_BREAK_SPACE: i64 = 5;

const ELLIPSIS: &str = "… ";

/// One piece of a split body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the thread, starting at 0
    pub index: usize,
    pub text: String,
    /// More chunks follow this one
    pub is_continuation: bool,
}

impl Chunk {
    /// Text as submitted, with `suffix` appended to continuation chunks
    pub fn render(&self, suffix: &str) -> String {
        if self.is_continuation {
            format!("{}{}", self.text, suffix)
        } else {
            self.text.clone()
        }
    }
}

/// What to do with a body that exceeds the hard limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitMode {
    /// Break into a chain of chunks
    Split,
    /// Keep the first chunk only and link to the full post
    Truncate { permalink: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    pub soft_limit: usize,
    pub hard_limit: usize,
    pub short_url_length: usize,
    pub mode: SplitMode,
}

/// Break `body` into chunks that each fit the destination
pub fn split(body: &str, options: &SplitOptions) -> Vec<Chunk> {
    let l = options.short_url_length;
    if estimate(body, l) <= options.hard_limit {
        return finish(vec![body.trim().to_string()], false);
    }

    debug!(
        length = estimate(body, l),
        hard_limit = options.hard_limit,
        "body exceeds limit, splitting"
    );

    let soft = options.soft_limit;
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in body.split(' ') {
        let candidate = format!("{} {}", current, word);
        if estimate(&candidate, l) <= soft {
            current = candidate;
            continue;
        }

        match &options.mode {
            SplitMode::Split => {
                let space_left = soft as i64 - estimate(&current, l) as i64 - 1;
                let word_len = word.chars().count();

                if word_len > BREAKABLE_WORD_LEN
                    && space_left > MIN_BREAK_SPACE
                    && !contains_url(word)
                {
                    let (head, tail) = split_at_char(word, space_left as usize);
                    parts.push(format!("{} {}", current, head));
                    current = tail.to_string();
                } else {
                    if !current.trim().is_empty() {
                        parts.push(current);
                    }
                    current = word.to_string();
                }

                while estimate(&current, l) > soft {
                    let (head, tail) = split_at_char(&current, fit_prefix(&current, soft, l));
                    parts.push(head.to_string());
                    current = tail.to_string();
                }
            }
            SplitMode::Truncate { permalink } => {
                let reserved = ELLIPSIS.chars().count() + l;
                let keep = fit_prefix(&current, soft.saturating_sub(reserved), l);
                let (head, _) = split_at_char(&current, keep);
                parts.push(format!("{}{}{}", head.trim_end(), ELLIPSIS, permalink));
                return finish(parts, false);
            }
        }
    }

    if !current.trim().is_empty() || parts.is_empty() {
        parts.push(current);
    }

    finish(parts, true)
}

fn finish(parts: Vec<String>, continued: bool) -> Vec<Chunk> {
    let last = parts.len().saturating_sub(1);
    parts
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            index,
            text: text.trim().to_string(),
            is_continuation: continued && index < last,
        })
        .collect()
}

/// Longest prefix of `s`, in characters, whose estimate fits `limit`
///
/// Never less than one character so a hard cut always makes progress.
fn fit_prefix(s: &str, limit: usize, short_url_length: usize) -> usize {
    let mut best = 0;
    for (chars, (byte, c)) in s.char_indices().enumerate() {
        if estimate(&s[..byte + c.len_utf8()], short_url_length) <= limit {
            best = chars + 1;
        }
    }
    best.max(1)
}

/// Split at a character (not byte) offset
fn split_at_char(s: &str, n: usize) -> (&str, &str) {
    match s.char_indices().nth(n) {
        Some((byte, _)) => s.split_at(byte),
        None => (s, ""),
    }
}
