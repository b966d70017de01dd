use std::{fmt, time::Duration};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{question::Question, timer::TimerService};

/// Identifies a player. The bot uses the chat id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PlayerId {
    /// Key of the player's question deadline in the [`TimerService`].
    pub fn timeout_key(&self) -> String {
        format!("question-timeout:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Single,
    Sequence,
}

/// Identifies one question of one session. An armed timeout carries the
/// ticket of the question it was armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionTicket {
    pub session_id: Uuid,
    pub index: usize,
}

/// What [`SessionStore::modify`] does with the entry afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFate {
    Keep,
    Destroy,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    player: PlayerId,
    mode: SessionMode,
    questions: Vec<Question>,
    current_index: usize,
    question_started_at: Instant,
    resolved: bool,
    correct_count: u32,
    total_count: u32,
    display_name: Option<String>,
    created_at: Instant,
    last_activity: Instant,
}

impl Session {
    pub fn new(
        player: PlayerId,
        mode: SessionMode,
        questions: Vec<Question>,
        display_name: Option<String>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            player,
            mode,
            questions,
            current_index: 0,
            question_started_at: now,
            resolved: false,
            correct_count: 0,
            total_count: 0,
            display_name,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn ticket(&self) -> QuestionTicket {
        QuestionTicket {
            session_id: self.id,
            index: self.current_index,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn is_awaiting_answer(&self) -> bool {
        !self.resolved && self.current_question().is_some()
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Time since the current question was delivered.
    pub fn elapsed(&self) -> Duration {
        self.question_started_at.elapsed()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// The resolution gate. Flips `resolved` and hands out the current
    /// question exactly once per question; every later call gets `None`.
    pub fn try_resolve(&mut self) -> Option<&Question> {
        if !self.is_awaiting_answer() {
            return None;
        }
        self.resolved = true;
        self.last_activity = Instant::now();
        self.questions.get(self.current_index)
    }

    pub fn record(&mut self, correct: bool) {
        self.total_count += 1;
        if correct {
            self.correct_count += 1;
        }
    }

    /// Moves to the next question. Returns `false` once the list is exhausted.
    pub fn advance(&mut self) -> bool {
        self.current_index += 1;
        if self.current_question().is_none() {
            return false;
        }
        self.resolved = false;
        self.question_started_at = Instant::now();
        true
    }
}

/// Live sessions, at most one per player.
///
/// Entries are sharded; holding an entry's shard lock is the per-player lock
/// that serializes answers against timeouts. Closures passed in here run with
/// that lock held and must not block.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<PlayerId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player: PlayerId) -> Option<Session> {
        self.sessions.get(&player).map(|session| session.clone())
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.sessions.contains_key(&player)
    }

    pub fn put(&self, session: Session) -> Option<Session> {
        self.install(session, |_| ()).0
    }

    /// Inserts `session`, replacing the player's previous one, and runs
    /// `then` on it before the entry is unlocked.
    pub fn install<R>(&self, session: Session, then: impl FnOnce(&Session) -> R) -> (Option<Session>, R) {
        match self.sessions.entry(session.player()) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(session);
                let result = then(entry.get());
                (Some(previous), result)
            }
            Entry::Vacant(entry) => {
                let installed = entry.insert(session);
                (None, then(&installed))
            }
        }
    }

    pub fn delete(&self, player: PlayerId) -> Option<Session> {
        self.sessions.remove(&player).map(|(_, session)| session)
    }

    /// Runs `f` on the player's session under its lock, removing the session
    /// if `f` returns [`SessionFate::Destroy`]. `None` if there is no session.
    pub fn modify<R>(&self, player: PlayerId, f: impl FnOnce(&mut Session) -> (R, SessionFate)) -> Option<R> {
        match self.sessions.entry(player) {
            Entry::Occupied(mut entry) => {
                let (result, fate) = f(entry.get_mut());
                if fate == SessionFate::Destroy {
                    entry.remove();
                }
                Some(result)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Drops sessions idle for at least `idle` and disarms their deadlines.
    pub fn sweep(&self, idle: Duration, timers: &TimerService) -> Vec<PlayerId> {
        let mut expired = Vec::new();
        self.sessions.retain(|player, session| {
            if session.last_activity().elapsed() < idle {
                return true;
            }
            timers.cancel(&player.timeout_key());
            expired.push(*player);
            false
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{AnswerOption, Difficulty};

    fn question(answer: &str) -> Question {
        Question::new(
            "Pick one",
            vec![AnswerOption::new("A", "first"), AnswerOption::new("B", "second")],
            answer,
            Difficulty::Easy,
            10,
            None,
        )
    }

    fn sequence(player: i64, len: usize) -> Session {
        Session::new(
            PlayerId(player),
            SessionMode::Sequence,
            (0..len).map(|_| question("A")).collect(),
            None,
        )
    }

    #[tokio::test]
    async fn resolution_gate_opens_once_per_question() {
        let mut session = sequence(1, 2);

        assert!(session.try_resolve().is_some());
        assert!(session.try_resolve().is_none());

        assert!(session.advance());
        assert_eq!(session.current_index(), 1);
        assert!(session.try_resolve().is_some());
        assert!(session.try_resolve().is_none());

        assert!(!session.advance());
        assert!(session.current_question().is_none());
        assert!(session.try_resolve().is_none());
    }

    #[tokio::test]
    async fn ticket_changes_with_index_and_session() {
        let mut first = sequence(1, 2);
        let second = sequence(1, 2);

        let ticket = first.ticket();
        assert_ne!(ticket, second.ticket());

        first.try_resolve();
        first.advance();
        assert_ne!(ticket, first.ticket());
    }

    #[tokio::test]
    async fn modify_destroys_on_request() {
        let store = SessionStore::new();
        store.put(sequence(7, 1));

        let seen = store.modify(PlayerId(7), |session| (session.current_index(), SessionFate::Keep));
        assert_eq!(seen, Some(0));
        assert!(store.contains(PlayerId(7)));

        store.modify(PlayerId(7), |_| ((), SessionFate::Destroy));
        assert!(!store.contains(PlayerId(7)));
        assert_eq!(store.modify(PlayerId(7), |_| ((), SessionFate::Keep)), None);
    }

    #[tokio::test]
    async fn put_replaces_existing_session() {
        let store = SessionStore::new();
        let first = sequence(3, 1);
        let first_id = first.id();

        assert!(store.put(first).is_none());
        let replaced = store.put(sequence(3, 2)).unwrap();
        assert_eq!(replaced.id(), first_id);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(PlayerId(3)).unwrap().question_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_idle_sessions_and_their_timers() {
        let store = SessionStore::new();
        let timers = TimerService::new();

        store.put(sequence(1, 1));
        timers.schedule(PlayerId(1).timeout_key(), Duration::from_secs(600), || async {
            Ok::<(), crate::BoxError>(())
        });

        tokio::time::advance(Duration::from_secs(120)).await;
        store.put(sequence(2, 1));

        let expired = store.sweep(Duration::from_secs(60), &timers);
        assert_eq!(expired, vec![PlayerId(1)]);
        assert!(!store.contains(PlayerId(1)));
        assert!(store.contains(PlayerId(2)));
        assert!(!timers.is_armed(&PlayerId(1).timeout_key()));
    }
}
