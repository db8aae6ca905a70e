//! Timeline storage collaborator

use std::collections::HashMap;

use parking_lot::RwLock;

use skein_core::{Post, Timeline};

/// Storage the overlay consults to answer lookups
pub trait TimelineStore: Send + Sync {
    fn has_timeline(&self, username: &str) -> bool;

    fn get_timeline(&self, username: &str) -> Option<Timeline>;

    /// Posts of every held timeline matching `term`
    fn search_posts(&self, term: &str) -> Vec<Post>;

    /// Insert or replace a timeline
    fn put_timeline(&self, timeline: Timeline);

    /// Mutate a timeline in place, creating it empty when absent
    fn update_timeline(&self, username: &str, f: &mut dyn FnMut(&mut Timeline));

    /// Usernames of the held timelines
    fn usernames(&self) -> Vec<String>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    timelines: RwLock<HashMap<String, Timeline>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding an empty timeline for `owner`
    pub fn for_owner(owner: &str) -> Self {
        let store = Self::new();
        store.put_timeline(Timeline::new(owner));
        store
    }
}

impl TimelineStore for MemoryStore {
    fn has_timeline(&self, username: &str) -> bool {
        self.timelines.read().contains_key(username)
    }

    fn get_timeline(&self, username: &str) -> Option<Timeline> {
        self.timelines.read().get(username).cloned()
    }

    fn search_posts(&self, term: &str) -> Vec<Post> {
        self.timelines
            .read()
            .values()
            .flat_map(|t| t.related_posts(term))
            .collect()
    }

    fn put_timeline(&self, timeline: Timeline) {
        self.timelines
            .write()
            .insert(timeline.username.clone(), timeline);
    }

    fn update_timeline(&self, username: &str, f: &mut dyn FnMut(&mut Timeline)) {
        let mut timelines = self.timelines.write();
        let timeline = timelines
            .entry(username.to_string())
            .or_insert_with(|| Timeline::new(username));
        f(timeline);
    }

    fn usernames(&self) -> Vec<String> {
        self.timelines.read().keys().cloned().collect()
    }
}
