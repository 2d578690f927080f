//! # Help Module
//!
//! Reaction-driven paginated help messages.
//!
//! Each help message the bot sends gets a [`HelpSession`] keyed by its
//! message id. The ⬅️/➡️ reactions move the session one page; a move past
//! either end is rejected and the message stays as it is.
//!
//! Sessions live for the whole process, like the messages they describe.

pub mod pagination;

use dashmap::DashMap;
use serenity::model::id::MessageId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub use pagination::{
    page_range, total_pages, HelpContent, HelpSession, Navigation, RenderedPage,
    PAGINATION_REACTIONS, STICKERS_PER_PAGE, STICKERS_PER_ROW, STICKER_ROWS_PER_PAGE,
    STRINGS_PER_PAGE,
};

/// Exclusive access to one session, held across its page change and message edit.
pub type SessionGuard = OwnedMutexGuard<HelpSession>;

#[derive(Debug, Default)]
pub struct HelpSessions {
    sessions: DashMap<MessageId, Arc<Mutex<HelpSession>>>,
}

impl HelpSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session, returning how many are live.
    pub fn insert(&self, message_id: MessageId, session: HelpSession) -> usize {
        self.sessions
            .insert(message_id, Arc::new(Mutex::new(session)));
        self.sessions.len()
    }

    pub fn contains(&self, message_id: MessageId) -> bool {
        self.sessions.contains_key(&message_id)
    }

    /// Waits for the session of `message_id`, if there is one.
    ///
    /// Reactions on the same message are handled one at a time while the guard
    /// lives, so edits reach the chat in the order the pages changed.
    pub async fn lock(&self, message_id: MessageId) -> Option<SessionGuard> {
        let session = self.sessions.get(&message_id)?.clone();
        Some(session.lock_owned().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn listing(n: usize) -> HelpSession {
        HelpSession::new(HelpContent::listing(
            "Categories",
            (0..n).map(|i| format!("c{i:02}")).collect(),
        ))
    }

    #[tokio::test]
    async fn test_lock_unknown_message() {
        let sessions = HelpSessions::new();
        assert!(sessions.lock(MessageId::new(1)).await.is_none());
        assert!(!sessions.contains(MessageId::new(1)));
    }

    #[tokio::test]
    async fn test_navigation_is_kept_between_locks() {
        let sessions = HelpSessions::new();
        let id = MessageId::new(42);
        assert_eq!(sessions.insert(id, listing(15)), 1);

        {
            let mut session = sessions.lock(id).await.unwrap();
            assert!(!session.navigate(Navigation::Previous));
            assert!(session.navigate(Navigation::Next));
        }

        let mut session = sessions.lock(id).await.unwrap();
        let page = session.render();
        assert_eq!(page.footer, "Page 2/2");
        assert_eq!(page.description.as_deref(), Some("c10\nc11\nc12\nc13\nc14\n"));
        assert!(!session.navigate(Navigation::Next));
    }

    #[tokio::test]
    async fn test_second_reaction_waits_for_first() {
        let sessions = Arc::new(HelpSessions::new());
        let id = MessageId::new(7);
        sessions.insert(id, listing(35));

        let mut first = sessions.lock(id).await.unwrap();
        assert!(first.navigate(Navigation::Next));

        let second = tokio::spawn({
            let sessions = sessions.clone();
            async move {
                let mut session = sessions.lock(id).await.unwrap();
                session.navigate(Navigation::Next);
                session.render().footer
            }
        });

        // Still editing page 2: the second reaction must not jump ahead
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());
        assert_eq!(first.render().footer, "Page 2/4");
        drop(first);

        assert_eq!(second.await.unwrap(), "Page 3/4");
    }
}
