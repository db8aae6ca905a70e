//! Timelines and posts
//!
//! A timeline is the append-only feed of one username. Posts are keyed by
//! a per-timeline sequence number. Signatures are opaque bytes produced by
//! the authentication collaborator over `signing_bytes()`.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A single post
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Sequence number within the author's timeline
    pub id: u64,
    /// Author username
    pub author: String,
    pub content: String,
    /// Creation or last edit time (ms)
    pub timestamp: u64,
    /// Author signature over `signing_bytes()`
    #[serde(default)]
    pub signature: Option<Vec<u8>>,
    /// Set by the receiver once the signature has been checked
    #[serde(default)]
    pub verified: bool,
}

impl Post {
    pub fn new(id: u64, author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            author: author.into(),
            content: content.into(),
            timestamp: now_millis(),
            signature: None,
            verified: false,
        }
    }

    /// Canonical bytes covered by the post signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        format!(
            "post\n{}\n{}\n{}\n{}",
            self.author, self.id, self.timestamp, self.content
        )
        .into_bytes()
    }

    pub fn has_signature(&self) -> bool {
        self.signature.is_some()
    }

    /// Case-insensitive content match used by searches
    pub fn matches(&self, term: &str) -> bool {
        !term.is_empty() && self.content.to_lowercase().contains(&term.to_lowercase())
    }
}

/// The feed of one username
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub username: String,
    posts: BTreeMap<u64, Post>,
    last_post_id: u64,
    /// Time of the last mutation (ms)
    pub last_update: u64,
    #[serde(default)]
    pub signature: Option<Vec<u8>>,
    #[serde(default)]
    pub verified: bool,
}

impl Timeline {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            posts: BTreeMap::new(),
            last_post_id: 0,
            last_update: now_millis(),
            signature: None,
            verified: false,
        }
    }

    /// Append a post and return a copy of it
    pub fn add_post(&mut self, content: impl Into<String>) -> Post {
        self.last_post_id += 1;
        let post = Post::new(self.last_post_id, self.username.clone(), content);
        self.posts.insert(post.id, post.clone());
        self.touch();
        post
    }

    /// Replace the content of an existing post
    pub fn update_post(&mut self, id: u64, content: impl Into<String>) -> bool {
        let Some(post) = self.posts.get_mut(&id) else {
            return false;
        };
        post.content = content.into();
        post.timestamp = now_millis();
        post.signature = None;
        self.touch();
        true
    }

    pub fn delete_post(&mut self, id: u64) -> bool {
        if self.posts.remove(&id).is_some() {
            self.touch();
            true
        } else {
            false
        }
    }

    pub fn post(&self, id: u64) -> Option<&Post> {
        self.posts.get(&id)
    }

    /// Posts in id order
    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.posts.values()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Posts whose content matches `term`
    pub fn related_posts(&self, term: &str) -> Vec<Post> {
        self.posts.values().filter(|p| p.matches(term)).cloned().collect()
    }

    pub fn has_signature(&self) -> bool {
        self.signature.is_some()
    }

    /// Canonical bytes covered by the timeline signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = format!("timeline\n{}\n{}\n", self.username, self.last_update);
        for post in self.posts.values() {
            out.push_str(&format!("{}|{}|{}\n", post.id, post.timestamp, post.content));
        }
        out.into_bytes()
    }

    fn touch(&mut self) {
        self.last_update = now_millis();
        self.signature = None;
        self.verified = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_ids_are_sequential() {
        let mut timeline = Timeline::new("alice");
        let a = timeline.add_post("first");
        let b = timeline.add_post("second");

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(b.author, "alice");
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn test_delete_does_not_reuse_ids() {
        let mut timeline = Timeline::new("alice");
        timeline.add_post("first");
        assert!(timeline.delete_post(1));
        assert!(!timeline.delete_post(1));

        let next = timeline.add_post("again");
        assert_eq!(next.id, 2);
    }

    #[test]
    fn test_update_post_clears_signature() {
        let mut timeline = Timeline::new("alice");
        timeline.add_post("draft");
        timeline.signature = Some(vec![1, 2, 3]);

        assert!(timeline.update_post(1, "final"));
        assert_eq!(timeline.post(1).map(|p| p.content.as_str()), Some("final"));
        assert!(!timeline.has_signature());
        assert!(!timeline.update_post(9, "missing"));
    }

    #[test]
    fn test_related_posts_case_insensitive() {
        let mut timeline = Timeline::new("alice");
        timeline.add_post("Rust is fun");
        timeline.add_post("so is gardening");

        let hits = timeline.related_posts("rust");
        assert_eq!(hits.len(), 1);
        assert!(timeline.related_posts("").is_empty());
    }

    #[test]
    fn test_signing_bytes_track_content() {
        let mut timeline = Timeline::new("alice");
        timeline.add_post("one");
        let before = timeline.signing_bytes();
        timeline.update_post(1, "two");
        assert_ne!(before, timeline.signing_bytes());
    }
}
