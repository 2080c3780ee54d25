//! Scraping story listings and comment sections out of the site's
//! table-based markup.
//!
//! The markup is not an API: everything here is coupled to the exact
//! attribute quoting and class names news.ycombinator.com renders today.
//! Rows that fail to yield their mandatory fields are skipped rather than
//! failing the whole page, but a page with no recognizable listing at all
//! is reported as an error.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::items::{Comment, Story};

/// The site indents one reply level by widening a spacer gif this many
/// pixels.
const INDENT_PIXELS: usize = 40;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("no story listing found in page")]
    MissingListing,
    #[error("page does not contain a {0} form")]
    MissingForm(&'static str),
}

static STORY_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<tr class=['"]athing[^'"]*['"] id=['"](\d+)['"]>"#).expect("valid story row regex")
});

static TITLELINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span class=['"]titleline['"]>\s*<a href=['"]([^'"]+)['"][^>]*>([^<]+)</a>"#)
        .expect("valid titleline regex")
});

static SCORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span class=['"]score['"][^>]*>(\d+)\s*points?"#).expect("valid score regex")
});

static USER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"class=['"]hnuser['"][^>]*>([^<]+)<"#).expect("valid hnuser regex"));

static AGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span class=['"]age['"][^>]*>(?:<a[^>]*>)?([^<]+)"#).expect("valid age regex")
});

static ITEM_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a href=['"]item\?id=\d+['"][^>]*>(.*?)</a>"#).expect("valid item link regex")
});

static COMMENT_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<tr class=['"]athing comtr['"] id=['"](\d+)['"]>"#)
        .expect("valid comment row regex")
});

static INDENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<img src=['"]s\.gif['"][^>]*width=['"](\d+)['"]"#).expect("valid indent regex")
});

static COMMTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class=['"]commtext[^'"]*['"]>(.*?)(?:<div class=['"]reply['"]|</td>)"#)
        .expect("valid commtext regex")
});

static HIDDEN_INPUT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<input[^>]*type=['"]hidden['"][^>]*>"#).expect("valid hidden input regex")
});

static ATTR_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name=['"]([^'"]*)['"]"#).expect("valid name attr regex"));

static ATTR_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"value=['"]([^'"]*)['"]"#).expect("valid value attr regex"));

static ME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"id=['"]me['"][^>]*>([^<]+)</a>"#).expect("valid me link regex")
});

static KARMA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"id=['"]me['"][^>]*>[^<]+</a>[^(<]*\((\d+)\)"#).expect("valid karma regex")
});

static PARA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<p[^>]*>").expect("valid paragraph tag regex"));

static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid break tag regex"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid tag regex"));

/// Extracts the stories of a listing page (front page, newest, ask, jobs)
/// in rank order.
///
/// A row without a score span and comment link is a job posting: it keeps
/// only title, url and age. Rows missing a title are dropped.
pub fn stories(html: &str) -> Result<Vec<Story>, ScrapeError> {
    let rows = split_rows(html, &STORY_ROW_RE);
    if rows.is_empty() {
        return Err(ScrapeError::MissingListing);
    }

    let mut out = Vec::with_capacity(rows.len());
    for (id, chunk) in rows {
        let Some(title_caps) = TITLELINE_RE.captures(chunk) else {
            continue;
        };
        let url = decode(&title_caps[1]);
        let title = decode(&title_caps[2]);
        let age = AGE_RE
            .captures(chunk)
            .map(|caps| decode(&caps[1]).trim().to_string())
            .unwrap_or_default();

        let comments_count = comments_count(chunk);
        match comments_count {
            Some(count) => out.push(Story {
                id,
                title,
                url,
                author: USER_RE
                    .captures(chunk)
                    .map(|caps| decode(&caps[1]))
                    .unwrap_or_default(),
                points: SCORE_RE
                    .captures(chunk)
                    .and_then(|caps| caps[1].parse().ok())
                    .unwrap_or(0),
                age,
                comments_count: count,
                job: false,
            }),
            None => out.push(Story {
                id,
                title,
                url,
                author: String::new(),
                points: 0,
                age,
                comments_count: 0,
                job: true,
            }),
        }
    }
    Ok(out)
}

/// Extracts the flat comment sequence of a thread page in document order.
///
/// Depth is the spacer-image width divided by the site's per-level pixel
/// constant. Rows without an author (deleted/flagged placeholders) are
/// skipped, which keeps depths non-negative and text well-defined for the
/// tree builder downstream.
pub fn comments(html: &str, story_id: i64) -> Vec<Comment> {
    let mut out = Vec::new();
    for (id, chunk) in split_rows(html, &COMMENT_ROW_RE) {
        let Some(indent) = INDENT_RE
            .captures(chunk)
            .and_then(|caps| caps[1].parse::<usize>().ok())
        else {
            continue;
        };
        let Some(author) = USER_RE.captures(chunk).map(|caps| decode(&caps[1])) else {
            continue;
        };
        let age = AGE_RE
            .captures(chunk)
            .map(|caps| decode(&caps[1]).trim().to_string())
            .unwrap_or_default();
        let text = COMMTEXT_RE
            .captures(chunk)
            .map(|caps| clean_text(&caps[1]))
            .unwrap_or_default();

        out.push(Comment::new(
            id,
            story_id,
            author,
            text,
            age,
            indent / INDENT_PIXELS,
        ));
    }
    out
}

/// Collects the hidden inputs of the first form on the page, in document
/// order. Login and reply forms smuggle their anti-forgery state through
/// these (`fnid`, `hmac`, `parent`, `goto`).
pub fn hidden_fields(html: &str) -> Vec<(String, String)> {
    HIDDEN_INPUT_RE
        .find_iter(html)
        .filter_map(|input| {
            let tag = input.as_str();
            let name = ATTR_NAME_RE.captures(tag)?[1].to_string();
            let value = ATTR_VALUE_RE
                .captures(tag)
                .map(|caps| decode(&caps[1]))
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// Looks up a named hidden field, for callers that need one specific token.
pub fn hidden_field(html: &str, name: &str, form: &'static str) -> Result<String, ScrapeError> {
    hidden_fields(html)
        .into_iter()
        .find(|(field, _)| field == name)
        .map(|(_, value)| value)
        .ok_or(ScrapeError::MissingForm(form))
}

/// The logged-in user's name and karma from the page header, if any.
pub fn logged_in_user(html: &str) -> Option<(String, i64)> {
    let name = decode(&ME_RE.captures(html)?[1]);
    let karma = KARMA_RE
        .captures(html)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0);
    Some((name, karma))
}

/// Reduces a comment-body fragment to plain text: paragraph tags become
/// blank lines, remaining tags are dropped, entities are decoded.
pub fn clean_text(fragment: &str) -> String {
    let with_paras = PARA_RE.replace_all(fragment, "\n\n");
    let with_breaks = BREAK_RE.replace_all(&with_paras, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    let decoded = html_escape::decode_html_entities(stripped.as_ref()).to_string();
    decoded
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Splits a page into `(row id, chunk)` pairs at every match of the row
/// opener; each chunk runs to the next row (or end of page), so the
/// trailing subtext row travels with its story.
fn split_rows<'a>(html: &'a str, opener: &Regex) -> Vec<(i64, &'a str)> {
    let marks: Vec<(usize, i64)> = opener
        .captures_iter(html)
        .filter_map(|caps| {
            let mat = caps.get(0)?;
            let id = caps[1].parse().ok()?;
            Some((mat.start(), id))
        })
        .collect();

    marks
        .iter()
        .enumerate()
        .map(|(ix, &(start, id))| {
            let end = marks.get(ix + 1).map_or(html.len(), |&(next, _)| next);
            (id, &html[start..end])
        })
        .collect()
}

fn comments_count(chunk: &str) -> Option<i64> {
    for caps in ITEM_LINK_RE.captures_iter(chunk) {
        let label = decode(&caps[1]);
        let label = label.trim();
        if label == "discuss" {
            return Some(0);
        }
        if label.contains("comment") {
            let digits: String = label.chars().take_while(char::is_ascii_digit).collect();
            return digits.parse().ok().or(Some(0));
        }
    }
    None
}

fn decode(text: &str) -> String {
    html_escape::decode_html_entities(text).to_string()
}
