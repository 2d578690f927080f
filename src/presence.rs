//! Last-known voice channel of every user the bot can see.
//!
//! Keyed by the unique username (platform tag), which is also the name of
//! the user's entry sound in the catalog. Records are replaced on every voice
//! state update and never pruned.

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use tracing::debug;

use crate::audio::VoiceTarget;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoicePresence {
    /// `None` while the user is not connected to voice.
    pub channel: Option<ChannelId>,
    pub guild: Option<GuildId>,
}

impl VoicePresence {
    pub fn connected(channel: ChannelId, guild: GuildId) -> Self {
        Self {
            channel: Some(channel),
            guild: Some(guild),
        }
    }

    pub fn idle(guild: GuildId) -> Self {
        Self {
            channel: None,
            guild: Some(guild),
        }
    }
}

/// Whether moving from `previous` to `next` should play the user's entry sound.
///
/// Fires when joining voice from nothing, when coming back from the guild's
/// AFK channel, or when arriving from another guild. Never fires on leave.
pub fn should_trigger_entry(
    previous: &VoicePresence,
    next: &VoicePresence,
    afk_channel: Option<ChannelId>,
) -> bool {
    if next.channel.is_none() {
        return false;
    }

    previous.channel.is_none()
        || (afk_channel.is_some() && previous.channel == afk_channel)
        || previous.guild != next.guild
}

#[derive(Debug, Default)]
pub struct PresenceTracker {
    records: DashMap<String, VoicePresence>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `next` for `user` and returns whether the entry sound should play.
    ///
    /// A user never seen before counts as not connected anywhere.
    pub fn observe(&self, user: &str, next: VoicePresence, afk_channel: Option<ChannelId>) -> bool {
        let previous = self
            .records
            .insert(user.to_string(), next)
            .unwrap_or_default();

        debug!(
            user,
            channel = ?next.channel,
            guild = ?next.guild,
            previous_channel = ?previous.channel,
            previous_guild = ?previous.guild,
            "Voice state change"
        );

        should_trigger_entry(&previous, &next, afk_channel)
    }

    /// Startup seeding for one guild.
    ///
    /// Members default to "not in voice" unless already seen in another guild;
    /// `voice_states` (users currently connected) always overwrite. Returns the
    /// number of newly tracked users.
    pub fn seed_guild(
        &self,
        guild: GuildId,
        members: impl IntoIterator<Item = String>,
        voice_states: impl IntoIterator<Item = (String, ChannelId)>,
    ) -> usize {
        let mut tracked = 0;
        for member in members {
            self.records.entry(member).or_insert_with(|| {
                tracked += 1;
                VoicePresence::idle(guild)
            });
        }

        for (user, channel) in voice_states {
            self.records
                .insert(user, VoicePresence::connected(channel, guild));
        }

        tracked
    }

    pub fn get(&self, user: &str) -> Option<VoicePresence> {
        self.records.get(user).map(|p| *p)
    }

    /// Where to play a sound for `user` invoking a command in `guild`.
    ///
    /// Only when the user is connected to voice in that same guild.
    pub fn voice_target(&self, user: &str, guild: GuildId) -> Option<VoiceTarget> {
        let presence = self.get(user)?;
        match (presence.channel, presence.guild) {
            (Some(channel_id), Some(g)) if g == guild => Some(VoiceTarget {
                guild_id: guild,
                channel_id,
            }),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: GuildId = GuildId::new(100);
    const G2: GuildId = GuildId::new(200);
    const A: ChannelId = ChannelId::new(1);
    const B: ChannelId = ChannelId::new(2);
    const AFK: ChannelId = ChannelId::new(9);

    #[test]
    fn test_joining_from_nothing_triggers() {
        let tracker = PresenceTracker::new();
        assert!(tracker.observe("alice", VoicePresence::connected(A, G), Some(AFK)));
    }

    #[test]
    fn test_moving_within_guild_does_not_trigger() {
        let tracker = PresenceTracker::new();
        tracker.observe("alice", VoicePresence::connected(A, G), Some(AFK));
        assert!(!tracker.observe("alice", VoicePresence::connected(B, G), Some(AFK)));
    }

    #[test]
    fn test_returning_from_afk_triggers() {
        let tracker = PresenceTracker::new();
        tracker.observe("alice", VoicePresence::connected(AFK, G), Some(AFK));
        assert!(tracker.observe("alice", VoicePresence::connected(B, G), Some(AFK)));
    }

    #[test]
    fn test_switching_guilds_triggers() {
        let tracker = PresenceTracker::new();
        tracker.observe("alice", VoicePresence::connected(A, G), None);
        assert!(tracker.observe("alice", VoicePresence::connected(B, G2), None));
    }

    #[test]
    fn test_leaving_never_triggers_but_is_recorded() {
        let tracker = PresenceTracker::new();
        tracker.observe("alice", VoicePresence::connected(A, G), Some(AFK));
        assert!(!tracker.observe("alice", VoicePresence::idle(G), Some(AFK)));
        assert_eq!(tracker.get("alice"), Some(VoicePresence::idle(G)));

        // Unseen user leaving: still no trigger
        assert!(!tracker.observe("bob", VoicePresence::idle(G), None));
    }

    #[test]
    fn test_without_afk_channel_only_real_joins_trigger() {
        let previous = VoicePresence::connected(A, G);
        let next = VoicePresence::connected(B, G);
        assert!(!should_trigger_entry(&previous, &next, None));
    }

    #[test]
    fn test_seed_guild_overlays_voice_states() {
        let tracker = PresenceTracker::new();
        let tracked = tracker.seed_guild(
            G,
            ["alice".to_string(), "bob".to_string()],
            [("bob".to_string(), A)],
        );
        assert_eq!(tracked, 2);

        // alice already seen in G keeps her record
        let tracked = tracker.seed_guild(G2, ["alice".to_string(), "carol".to_string()], []);
        assert_eq!(tracked, 1);

        assert_eq!(tracker.get("alice"), Some(VoicePresence::idle(G)));
        assert_eq!(tracker.get("bob"), Some(VoicePresence::connected(A, G)));
        assert_eq!(tracker.get("carol"), Some(VoicePresence::idle(G2)));
        assert_eq!(tracker.len(), 3);

        // Seeded user joining voice triggers
        assert!(tracker.observe("alice", VoicePresence::connected(B, G), None));
    }

    #[test]
    fn test_voice_target_requires_same_guild() {
        let tracker = PresenceTracker::new();
        tracker.observe("alice", VoicePresence::connected(A, G), None);
        tracker.observe("bob", VoicePresence::idle(G), None);

        assert_eq!(
            tracker.voice_target("alice", G),
            Some(VoiceTarget {
                guild_id: G,
                channel_id: A
            })
        );
        assert_eq!(tracker.voice_target("alice", G2), None);
        assert_eq!(tracker.voice_target("bob", G), None);
        assert_eq!(tracker.voice_target("nobody", G), None);
    }
}
