use std::collections::HashSet;

use crate::apis::FeedPost;

/// Lower-case, drop punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop posts whose title matches an earlier post in `posts`, or whose id is
/// already in `already_seen`. The first occurrence of a title wins.
///
/// Titles are the primary signal because the providers assign unrelated ids
/// to the same paper. Posts with blank titles all normalize to "" and collapse
/// into one. `already_seen` is only read; the caller records kept ids.
pub fn dedupe(posts: Vec<FeedPost>, already_seen: &HashSet<String>) -> Vec<FeedPost> {
    let mut seen_titles: HashSet<String> = HashSet::new();
    posts
        .into_iter()
        .filter(|post| {
            if already_seen.contains(&post.id) {
                return false;
            }
            seen_titles.insert(normalize_title(&post.title))
        })
        .collect()
}
