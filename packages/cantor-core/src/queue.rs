//! Ordered track queue with play-next splicing.
//!
//! [`TrackQueue`] is a plain FIFO. It carries no lock of its own: each
//! queue is owned by one [`PlaybackSession`](crate::session::PlaybackSession)
//! and only touched while that session's lock is held, which is what makes
//! `snapshot` tear-free and `splice_to_front` atomic with respect to
//! concurrent enqueue/dequeue.

use std::collections::VecDeque;

use crate::track::Track;

/// FIFO of pending tracks for one channel.
#[derive(Debug, Default, Clone)]
pub struct TrackQueue {
    items: VecDeque<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track to the tail.
    ///
    /// Returns the 1-based position of the new track.
    pub fn enqueue(&mut self, track: Track) -> usize {
        self.items.push_back(track);
        self.items.len()
    }

    /// Removes and returns the head, or `None` when empty.
    pub fn dequeue(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    /// Inserts a track at the head, keeping every other track in order
    /// immediately behind it.
    pub fn splice_to_front(&mut self, track: Track) {
        self.items.push_front(track);
    }

    /// Returns an ordered copy of the pending tracks.
    pub fn snapshot(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    /// Discards every pending track, returning how many were dropped.
    pub fn drain(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Requester;

    fn track(title: &str) -> Track {
        Track::new(format!("http://media/{title}"), title, Requester::new("tester"))
    }

    fn titles(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(Track::title).collect()
    }

    #[test]
    fn dequeue_order_matches_enqueue_order() {
        let mut queue = TrackQueue::new();
        for title in ["a", "b", "c", "d"] {
            queue.enqueue(track(title));
        }

        let mut played = Vec::new();
        while let Some(t) = queue.dequeue() {
            played.push(t.title().to_string());
        }
        assert_eq!(played, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn enqueue_reports_one_based_position() {
        let mut queue = TrackQueue::new();
        assert_eq!(queue.enqueue(track("a")), 1);
        assert_eq!(queue.enqueue(track("b")), 2);
    }

    #[test]
    fn dequeue_on_empty_returns_none() {
        let mut queue = TrackQueue::new();
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn splice_puts_track_first_and_keeps_the_rest_in_order() {
        let mut queue = TrackQueue::new();
        queue.enqueue(track("a"));
        queue.enqueue(track("b"));
        queue.enqueue(track("c"));

        queue.splice_to_front(track("x"));
        assert_eq!(titles(&queue.snapshot()), vec!["x", "a", "b", "c"]);

        assert_eq!(queue.dequeue().unwrap().title(), "x");
        assert_eq!(queue.dequeue().unwrap().title(), "a");
        assert_eq!(queue.dequeue().unwrap().title(), "b");
        assert_eq!(queue.dequeue().unwrap().title(), "c");
    }

    #[test]
    fn snapshot_does_not_consume() {
        let mut queue = TrackQueue::new();
        queue.enqueue(track("a"));
        let _ = queue.snapshot();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drain_empties_and_counts() {
        let mut queue = TrackQueue::new();
        queue.enqueue(track("a"));
        queue.enqueue(track("b"));
        assert_eq!(queue.drain(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.drain(), 0);
    }
}
