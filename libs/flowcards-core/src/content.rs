//! Card-content transforms: note-field decoding, media reference tokens and
//! cloze deletion markers.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Unit separator delimiting note fields inside the package snapshot.
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// Divider inserted between trailing note fields when composing a back side.
pub const BACK_DIVIDER: &str = "<div class=\"card-divider\"></div>";

/// Scheme prefixing rewritten media references. Tokens are resolved at
/// render time instead of inlining binary data into card text.
pub const MEDIA_SCHEME: &str = "flowcards-media://";

lazy_static! {
    static ref SRC_ATTR: Regex = Regex::new(r#"src=["'](.*?)["']"#).unwrap();
    static ref CLOZE: Regex = Regex::new(r"\{\{c\d+::(.*?)(?:::.*?)?\}\}").unwrap();
}

/// Splits a note's field payload on the unit separator.
pub fn split_fields(flds: &str) -> Vec<&str> {
    flds.split(FIELD_SEPARATOR).collect()
}

/// Joins the non-blank trailing fields into a back side. An empty result is
/// valid: a note with no trailing content yields an empty back.
pub fn compose_back(fields: &[&str]) -> String {
    fields
        .iter()
        .filter(|field| !field.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(BACK_DIVIDER)
}

/// Rewrites `src` references pointing at known media files into scheme
/// tokens. Returns the rewritten markup plus the referenced filenames;
/// references to unknown files are left untouched.
pub fn rewrite_media_refs(html: &str, known: &HashSet<String>) -> (String, Vec<String>) {
    let mut referenced: Vec<String> = Vec::new();
    let rewritten = SRC_ATTR.replace_all(html, |caps: &Captures| {
        let filename = &caps[1];
        if known.contains(filename) {
            if !referenced.iter().any(|name| name == filename) {
                referenced.push(filename.to_string());
            }
            format!("src=\"{}\"", media_token(filename))
        } else {
            caps[0].to_string()
        }
    });
    (rewritten.into_owned(), referenced)
}

/// Content token for a media filename.
pub fn media_token(filename: &str) -> String {
    format!("{}{}", MEDIA_SCHEME, urlencoding::encode(filename))
}

/// Decodes a media token back to its filename, for render-time resolution.
pub fn filename_from_token(token: &str) -> Option<String> {
    token
        .strip_prefix(MEDIA_SCHEME)
        .and_then(|encoded| urlencoding::decode(encoded).ok())
        .map(|decoded| decoded.into_owned())
}

pub fn contains_cloze(html: &str) -> bool {
    html.contains("{{c")
}

/// Question side: occludes every cloze deletion.
pub fn cloze_question(html: &str) -> String {
    CLOZE
        .replace_all(html, "<span class=\"cloze-gap\">[...]</span>")
        .into_owned()
}

/// Answer side: reveals the deleted text, dropping any hint segment.
pub fn cloze_answer(html: &str) -> String {
    CLOZE
        .replace_all(html, "<b class=\"cloze-answer\">$1</b>")
        .into_owned()
}
