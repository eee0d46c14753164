//! Watches back-and-forth exchanges between pairs of users and decides when
//! to suggest moving the conversation into a private grotto.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Only exchanges inside this trailing window count toward a suggestion.
pub const EXCHANGE_WINDOW: Duration = Duration::from_secs(10 * 60);
/// Pair records idle for longer than this are dropped by [`ConversationMonitor::cleanup`].
pub const RECORD_TTL: Duration = Duration::from_secs(60 * 60);
/// How often the background sweep calls `cleanup`.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// Minimum gap between two posted suggestions for the same pair.
pub const SUGGESTION_COOLDOWN: Duration = Duration::from_secs(10 * 60);

const MIN_MESSAGES: usize = 5;
const MIN_PER_USER: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub should_suggest: bool,
    /// Empty unless `should_suggest`.
    pub users: Vec<String>,
    pub message_count: usize,
}

impl Suggestion {
    fn none() -> Self {
        Self {
            should_suggest: false,
            users: Vec::new(),
            message_count: 0,
        }
    }
}

#[derive(Debug)]
struct InteractionRecord {
    users: [String; 2],
    events: Vec<(String, Instant)>,
    audience: String,
    last_activity: Instant,
}

#[derive(Default)]
pub struct ConversationMonitor {
    records: DashMap<String, InteractionRecord>,
}

/// Order-independent key for a pair of usernames.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

pub fn suggestion_text(users: &[String]) -> String {
    let first = users.first().map(String::as_str).unwrap_or_default();
    let second = users.get(1).map(String::as_str).unwrap_or_default();
    format!(
        "🐬 I notice {first} and {second} are having a wonderful conversation! Would you like to continue in a private Grotto where you can chat more intimately? I can help you create one! 🌊✨"
    )
}

impl ConversationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `sender` just answered `other` in `audience`.
    pub fn track(&self, sender: &str, other: &str, audience: &str) -> Suggestion {
        self.track_at(sender, other, audience, Instant::now())
    }

    pub fn track_at(&self, sender: &str, other: &str, audience: &str, now: Instant) -> Suggestion {
        let mut record = self
            .records
            .entry(pair_key(sender, other))
            .or_insert_with(|| InteractionRecord {
                users: [sender.to_string(), other.to_string()],
                events: Vec::new(),
                audience: audience.to_string(),
                last_activity: now,
            });

        record.events.push((sender.to_string(), now));
        record.last_activity = now;
        record.audience = audience.to_string();
        record
            .events
            .retain(|(_, at)| now.saturating_duration_since(*at) < EXCHANGE_WINDOW);

        let count = record.events.len();
        if count < MIN_MESSAGES {
            return Suggestion::none();
        }

        let authored = |user: &str| record.events.iter().filter(|(from, _)| from == user).count();
        if authored(&record.users[0]) >= MIN_PER_USER && authored(&record.users[1]) >= MIN_PER_USER {
            Suggestion {
                should_suggest: true,
                users: record.users.to_vec(),
                message_count: count,
            }
        } else {
            Suggestion::none()
        }
    }

    /// Where the pair last talked, if tracked.
    pub fn audience(&self, a: &str, b: &str) -> Option<String> {
        self.records.get(&pair_key(a, b)).map(|r| r.audience.clone())
    }

    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    /// Drop pairs idle for longer than [`RECORD_TTL`]. Returns how many were dropped.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, r| now.saturating_duration_since(r.last_activity) <= RECORD_TTL);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Remembers when a suggestion was last posted for each pair.
#[derive(Default)]
pub struct SuggestionDebounce {
    last_posted: DashMap<String, Instant>,
}

impl SuggestionDebounce {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a suggestion for this pair may be posted now; records the post.
    pub fn try_post(&self, users: &[String]) -> bool {
        self.try_post_at(users, Instant::now())
    }

    pub fn try_post_at(&self, users: &[String], now: Instant) -> bool {
        let (Some(a), Some(b)) = (users.first(), users.get(1)) else {
            return false;
        };
        match self.last_posted.entry(pair_key(a, b)) {
            Entry::Occupied(mut posted) => {
                if now.saturating_duration_since(*posted.get()) >= SUGGESTION_COOLDOWN {
                    posted.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let before = self.last_posted.len();
        self.last_posted
            .retain(|_, at| now.saturating_duration_since(*at) < SUGGESTION_COOLDOWN);
        before - self.last_posted.len()
    }
}

/// The most recent human speaker in each audience, used to pair replies.
#[derive(Default)]
pub struct LastSpeakers {
    by_audience: DashMap<String, (String, Instant)>,
}

impl LastSpeakers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `speaker` as the latest in `audience`. Returns the previous
    /// speaker if it was someone else and spoke within [`EXCHANGE_WINDOW`].
    pub fn swap(&self, audience: &str, speaker: &str) -> Option<String> {
        self.swap_at(audience, speaker, Instant::now())
    }

    pub fn swap_at(&self, audience: &str, speaker: &str, now: Instant) -> Option<String> {
        let (previous, at) = self
            .by_audience
            .insert(audience.to_string(), (speaker.to_string(), now))?;
        (previous != speaker && now.saturating_duration_since(at) < EXCHANGE_WINDOW)
            .then_some(previous)
    }

    /// Forget audiences that have been quiet for [`EXCHANGE_WINDOW`].
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let before = self.by_audience.len();
        self.by_audience
            .retain(|_, (_, at)| now.saturating_duration_since(*at) < EXCHANGE_WINDOW);
        before - self.by_audience.len()
    }

    pub fn len(&self) -> usize {
        self.by_audience.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_audience.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(monitor: &ConversationMonitor, senders: &[&str], start: Instant) -> Vec<Suggestion> {
        senders
            .iter()
            .enumerate()
            .map(|(i, sender)| {
                let other = if *sender == "amy" { "bo" } else { "amy" };
                monitor.track_at(sender, other, "world", start + Duration::from_secs(i as u64))
            })
            .collect()
    }

    #[test]
    fn fifth_balanced_message_suggests() {
        let monitor = ConversationMonitor::new();
        let results = exchange(&monitor, &["amy", "bo", "amy", "bo", "amy"], Instant::now());

        assert!(results[..4].iter().all(|s| !s.should_suggest));
        let last = &results[4];
        assert!(last.should_suggest);
        assert_eq!(last.message_count, 5);
        assert_eq!(last.users, vec!["amy".to_string(), "bo".to_string()]);
    }

    #[test]
    fn one_sided_exchange_never_suggests() {
        let monitor = ConversationMonitor::new();
        let results = exchange(&monitor, &["amy", "amy", "amy", "amy", "bo"], Instant::now());
        assert!(results.iter().all(|s| !s.should_suggest));
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(pair_key("zed", "amy"), pair_key("amy", "zed"));

        let monitor = ConversationMonitor::new();
        let now = Instant::now();
        monitor.track_at("amy", "bo", "world", now);
        monitor.track_at("bo", "amy", "world", now);
        assert_eq!(monitor.len(), 1);
    }

    #[test]
    fn events_outside_window_do_not_count() {
        let monitor = ConversationMonitor::new();
        let start = Instant::now();
        exchange(&monitor, &["amy", "bo", "amy", "bo"], start);

        let later = start + EXCHANGE_WINDOW + Duration::from_secs(60);
        let s = monitor.track_at("amy", "bo", "world", later);
        assert!(!s.should_suggest);
    }

    #[test]
    fn repeated_qualifying_calls_keep_suggesting() {
        let monitor = ConversationMonitor::new();
        let results = exchange(
            &monitor,
            &["amy", "bo", "amy", "bo", "amy", "bo"],
            Instant::now(),
        );
        assert!(results[4].should_suggest);
        assert!(results[5].should_suggest);
    }

    #[test]
    fn cleanup_drops_idle_pairs() {
        let monitor = ConversationMonitor::new();
        let start = Instant::now();
        monitor.track_at("amy", "bo", "world", start);
        monitor.track_at("cy", "di", "peace", start + Duration::from_secs(30 * 60));

        let removed = monitor.cleanup_at(start + RECORD_TTL + Duration::from_secs(1));
        assert_eq!(removed, 1);
        assert_eq!(monitor.audience("cy", "di").as_deref(), Some("peace"));
        assert!(monitor.audience("amy", "bo").is_none());
    }

    #[test]
    fn debounce_enforces_cooldown() {
        let debounce = SuggestionDebounce::new();
        let pair = vec!["amy".to_string(), "bo".to_string()];
        let swapped = vec!["bo".to_string(), "amy".to_string()];
        let start = Instant::now();

        assert!(debounce.try_post_at(&pair, start));
        assert!(!debounce.try_post_at(&swapped, start + Duration::from_secs(60)));
        assert!(debounce.try_post_at(&pair, start + SUGGESTION_COOLDOWN));
    }

    #[test]
    fn last_speaker_pairs_only_recent_other_speakers() {
        let speakers = LastSpeakers::new();
        let start = Instant::now();

        assert_eq!(speakers.swap_at("world", "amy", start), None);
        assert_eq!(speakers.swap_at("world", "amy", start), None);
        assert_eq!(
            speakers.swap_at("world", "bo", start + Duration::from_secs(5)).as_deref(),
            Some("amy")
        );

        let stale = start + EXCHANGE_WINDOW + Duration::from_secs(60);
        assert_eq!(speakers.swap_at("world", "amy", stale), None);
    }

    #[test]
    fn last_speaker_cleanup_drops_quiet_audiences() {
        let speakers = LastSpeakers::new();
        let start = Instant::now();
        for i in 0..50 {
            speakers.swap_at(&format!("stream:s{i}"), "amy", start);
        }
        speakers.swap_at("world", "bo", start + EXCHANGE_WINDOW);

        let removed = speakers.cleanup_at(start + EXCHANGE_WINDOW + Duration::from_secs(1));
        assert_eq!(removed, 50);
        assert_eq!(speakers.len(), 1);
    }

    #[test]
    fn suggestion_names_both_users() {
        let text = suggestion_text(&["amy".to_string(), "bo".to_string()]);
        assert!(text.starts_with("🐬 I notice amy and bo are having"));
    }
}
