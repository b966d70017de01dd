//! Quiz session engine.
//!
//! Every question is resolved exactly once, either by the player's answer or
//! by its deadline. Both paths go through [`SessionStore::modify`], so they
//! are serialized per player and the first one to flip the session's
//! `resolved` flag wins; the other becomes a no-op. Presenter calls happen
//! only after the player's lock has been released.

use std::{future::Future, sync::Arc, time::Duration};

use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    question::{Question, QuestionSource},
    scoreboard::{percentage, ScoreBoard, ScoreRecord},
    selection::Selection,
    session::{PlayerId, QuestionTicket, Session, SessionFate, SessionMode, SessionStore},
    timer::TimerService,
    BoxError,
};

/// Outbound rendering boundary.
pub trait Presenter: Send + Sync + 'static {
    fn deliver_question(
        &self,
        player: PlayerId,
        question: &Question,
        index: usize,
        total: usize,
        seconds_remaining: u64,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;

    fn deliver_result(&self, player: PlayerId, report: &AnswerReport) -> impl Future<Output = Result<(), BoxError>> + Send;

    fn deliver_summary(
        &self,
        player: PlayerId,
        summary: &SessionSummary,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no questions available for this selection")]
    NoQuestionsAvailable,

    /// Session state was already updated; only the output was lost.
    #[error("failed to deliver output to player {player}")]
    Delivery {
        player: PlayerId,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
    TimedOut,
}

impl Verdict {
    /// An answer that arrives after the limit counts as a timeout even if the
    /// deadline task has not run yet.
    pub fn judge(answer_correct: bool, elapsed: Duration, time_limit: Duration) -> Self {
        if elapsed > time_limit {
            Verdict::TimedOut
        } else if answer_correct {
            Verdict::Correct
        } else {
            Verdict::Incorrect
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Fast,
    Good,
    Normal,
}

impl Speed {
    pub fn classify(elapsed: Duration, time_limit: Duration) -> Self {
        if elapsed.as_secs_f64() <= time_limit.as_secs_f64() * 0.5 {
            Speed::Fast
        } else if elapsed.as_secs_f64() <= time_limit.as_secs_f64() * 0.75 {
            Speed::Good
        } else {
            Speed::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Achievement {
    Perfect,
    Excellent,
    Good,
    None,
}

impl Achievement {
    pub fn from_percentage(percentage: f64) -> Self {
        match percentage {
            p if p >= 100.0 => Achievement::Perfect,
            p if p >= 80.0 => Achievement::Excellent,
            p if p >= 60.0 => Achievement::Good,
            _ => Achievement::None,
        }
    }
}

/// Outcome of one resolved question.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerReport {
    pub verdict: Verdict,
    pub given: Option<String>,
    pub correct_label: String,
    pub elapsed: Duration,
    pub time_limit: Duration,
    pub speed: Speed,
    /// Zero-based position of the question in its session.
    pub index: usize,
    pub total: usize,
    /// Cumulative record after this outcome.
    pub record: ScoreRecord,
}

impl AnswerReport {
    pub fn was_correct(&self) -> bool {
        self.verdict == Verdict::Correct
    }

    pub fn elapsed_seconds(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 10.0).round() / 10.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub mode: SessionMode,
    pub correct: u32,
    pub total: u32,
    pub percentage: f64,
    pub achievement: Achievement,
    pub record: Option<ScoreRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Started {
    pub session_id: Uuid,
    pub question_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Resolved(Verdict),
    NoActiveQuestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    Resolved,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NoActiveSession,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sessions without activity for this long are swept.
    pub session_idle: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_idle: Duration::from_secs(30 * 60),
        }
    }
}

/// Output produced inside the critical section, delivered after it.
#[derive(Debug)]
enum Delivery {
    Question {
        question: Question,
        index: usize,
        total: usize,
        seconds_remaining: u64,
    },
    Result(AnswerReport),
    Summary(SessionSummary),
}

impl Delivery {
    fn current_question(session: &Session) -> Option<Self> {
        session.current_question().map(|question| Delivery::Question {
            question: question.clone(),
            index: session.current_index(),
            total: session.question_count(),
            seconds_remaining: question.time_limit().as_secs(),
        })
    }
}

struct EngineInner<S, P> {
    source: S,
    presenter: P,
    sessions: SessionStore,
    scores: ScoreBoard,
    timers: TimerService,
    config: EngineConfig,
}

pub struct SessionEngine<S, P> {
    inner: Arc<EngineInner<S, P>>,
}

impl<S, P> Clone for SessionEngine<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: QuestionSource, P: Presenter> SessionEngine<S, P> {
    pub fn new(source: S, presenter: P, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                source,
                presenter,
                sessions: SessionStore::new(),
                scores: ScoreBoard::new(),
                timers: TimerService::new(),
                config,
            }),
        }
    }

    pub fn scoreboard(&self) -> &ScoreBoard {
        &self.inner.scores
    }

    pub fn session_snapshot(&self, player: PlayerId) -> Option<Session> {
        self.inner.sessions.get(player)
    }

    pub fn has_session(&self, player: PlayerId) -> bool {
        self.inner.sessions.contains(player)
    }

    pub fn is_deadline_armed(&self, player: PlayerId) -> bool {
        self.inner.timers.is_armed(&player.timeout_key())
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    /// One question picked uniformly from the whole pool.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn start_single(&self, player: PlayerId, display_name: Option<String>) -> Result<Started, EngineError> {
        let question = self
            .inner
            .source
            .all_questions()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(EngineError::NoQuestionsAvailable)?;

        self.begin(player, SessionMode::Single, vec![question], display_name)
            .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn start_sequence(
        &self,
        player: PlayerId,
        display_name: Option<String>,
        selection: &Selection,
    ) -> Result<Started, EngineError> {
        let questions = selection.draw(self.inner.source.all_questions(), &mut rand::thread_rng());
        if questions.is_empty() {
            tracing::info!(%player, ?selection, "no questions match selection");
            return Err(EngineError::NoQuestionsAvailable);
        }

        self.begin(player, SessionMode::Sequence, questions, display_name)
            .await
    }

    async fn begin(
        &self,
        player: PlayerId,
        mode: SessionMode,
        questions: Vec<Question>,
        display_name: Option<String>,
    ) -> Result<Started, EngineError> {
        let session = Session::new(player, mode, questions, display_name);
        let started = Started {
            session_id: session.id(),
            question_count: session.question_count(),
        };

        let (previous, first) = self.inner.sessions.install(session, |session| {
            self.arm_deadline(session);
            Delivery::current_question(session)
        });

        if let Some(previous) = previous {
            tracing::info!(%player, previous = %previous.id(), "replaced unfinished session");
        }
        tracing::info!(
            %player,
            session = %started.session_id,
            ?mode,
            questions = started.question_count,
            "session started"
        );

        self.dispatch(player, first.into_iter().collect()).await?;
        Ok(started)
    }

    /// Resolves the current question with the player's `label`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn submit_answer(&self, player: PlayerId, label: &str) -> Result<SubmitOutcome, EngineError> {
        self.submit(player, None, label).await
    }

    /// Like [`submit_answer`](Self::submit_answer), but only if `index` is
    /// still the open question. A repeated or late button press for an
    /// earlier question gets `NoActiveQuestion` instead of answering the
    /// next one.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn submit_answer_at(
        &self,
        player: PlayerId,
        index: usize,
        label: &str,
    ) -> Result<SubmitOutcome, EngineError> {
        self.submit(player, Some(index), label).await
    }

    async fn submit(&self, player: PlayerId, index: Option<usize>, label: &str) -> Result<SubmitOutcome, EngineError> {
        let resolved = self
            .inner
            .sessions
            .modify(player, |session| {
                if index.is_some_and(|index| index != session.current_index()) {
                    return (None, SessionFate::Keep);
                }
                session.touch();
                match self.resolve(session, Some(label)) {
                    Some((verdict, deliveries, fate)) => (Some((verdict, deliveries)), fate),
                    None => (None, SessionFate::Keep),
                }
            })
            .flatten();

        let Some((verdict, deliveries)) = resolved else {
            tracing::debug!(%player, ?index, "answer without an active question");
            return Ok(SubmitOutcome::NoActiveQuestion);
        };

        tracing::info!(%player, answer = label, ?verdict, "question answered");
        self.dispatch(player, deliveries).await?;
        Ok(SubmitOutcome::Resolved(verdict))
    }

    /// Deadline path, called by the question timer the engine arms for every
    /// delivered question. Transport code answers through
    /// [`submit_answer`](Self::submit_answer) instead. A ticket that no
    /// longer matches the session's current question is ignored.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn handle_timeout(&self, player: PlayerId, ticket: QuestionTicket) -> Result<TimeoutOutcome, EngineError> {
        let resolved = self
            .inner
            .sessions
            .modify(player, |session| {
                if session.ticket() != ticket {
                    return (None, SessionFate::Keep);
                }
                match self.resolve(session, None) {
                    Some((_, deliveries, fate)) => (Some(deliveries), fate),
                    None => (None, SessionFate::Keep),
                }
            })
            .flatten();

        let Some(deliveries) = resolved else {
            return Ok(TimeoutOutcome::Ignored);
        };

        tracing::info!(%player, question = ticket.index, "question timed out");
        self.dispatch(player, deliveries).await?;
        Ok(TimeoutOutcome::Resolved)
    }

    /// Abandons the player's session without scoring the open question.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn cancel(&self, player: PlayerId) -> CancelOutcome {
        let cancelled = self.inner.sessions.modify(player, |session| {
            self.inner.timers.cancel(&player.timeout_key());
            (session.id(), SessionFate::Destroy)
        });

        match cancelled {
            Some(session) => {
                tracing::info!(%player, %session, "session cancelled");
                CancelOutcome::Cancelled
            }
            None => CancelOutcome::NoActiveSession,
        }
    }

    /// Drops sessions idle past the retention window. Returns how many.
    pub fn sweep_idle(&self) -> usize {
        let expired = self
            .inner
            .sessions
            .sweep(self.inner.config.session_idle, &self.inner.timers);
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), players = ?expired, "swept idle sessions");
        }
        expired.len()
    }

    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                engine.sweep_idle();
            }
        })
    }

    /// Runs with the player's lock held. `None` if the gate was already
    /// closed.
    fn resolve(&self, session: &mut Session, answer: Option<&str>) -> Option<(Verdict, Vec<Delivery>, SessionFate)> {
        let elapsed = session.elapsed();
        let (correct_label, time_limit, answer_correct) = {
            let question = session.try_resolve()?;
            let answer_correct = answer.is_some_and(|label| question.is_correct(label));
            (question.answer().to_owned(), question.time_limit(), answer_correct)
        };
        self.inner.timers.cancel(&session.player().timeout_key());

        let verdict = match answer {
            Some(_) => Verdict::judge(answer_correct, elapsed, time_limit),
            None => Verdict::TimedOut,
        };
        let correct = verdict == Verdict::Correct;

        session.record(correct);
        let record = self
            .inner
            .scores
            .record_outcome(session.player(), session.display_name(), correct);

        let report = AnswerReport {
            verdict,
            given: answer.map(|label| label.trim().to_owned()),
            correct_label,
            elapsed,
            time_limit,
            speed: Speed::classify(elapsed, time_limit),
            index: session.current_index(),
            total: session.question_count(),
            record,
        };

        let mut deliveries = vec![Delivery::Result(report)];
        let fate = self.advance(session, &mut deliveries);
        Some((verdict, deliveries, fate))
    }

    fn advance(&self, session: &mut Session, deliveries: &mut Vec<Delivery>) -> SessionFate {
        if session.advance() {
            self.arm_deadline(session);
            deliveries.extend(Delivery::current_question(session));
            return SessionFate::Keep;
        }

        let session_percentage = percentage(session.correct_count(), session.total_count());
        let summary = SessionSummary {
            mode: session.mode(),
            correct: session.correct_count(),
            total: session.total_count(),
            percentage: session_percentage,
            achievement: Achievement::from_percentage(session_percentage),
            record: self.inner.scores.record(session.player()),
        };
        tracing::info!(
            player = %session.player(),
            session = %session.id(),
            correct = summary.correct,
            total = summary.total,
            percentage = summary.percentage,
            "session finished"
        );
        deliveries.push(Delivery::Summary(summary));
        SessionFate::Destroy
    }

    fn arm_deadline(&self, session: &Session) {
        let Some(question) = session.current_question() else {
            return;
        };
        let engine = self.clone();
        let player = session.player();
        let ticket = session.ticket();

        self.inner
            .timers
            .schedule(player.timeout_key(), question.time_limit(), move || async move {
                engine
                    .handle_timeout(player, ticket)
                    .await
                    .map(|_| ())
                    .map_err(BoxError::from)
            });
    }

    /// Sends everything in order. A failed delivery is logged and does not
    /// stop the ones after it; the first failure is returned.
    async fn dispatch(&self, player: PlayerId, deliveries: Vec<Delivery>) -> Result<(), EngineError> {
        let presenter = &self.inner.presenter;
        let mut failure = None;

        for delivery in deliveries {
            let sent = match &delivery {
                Delivery::Question {
                    question,
                    index,
                    total,
                    seconds_remaining,
                } => {
                    presenter
                        .deliver_question(player, question, *index, *total, *seconds_remaining)
                        .await
                }
                Delivery::Result(report) => presenter.deliver_result(player, report).await,
                Delivery::Summary(summary) => presenter.deliver_summary(player, summary).await,
            };

            if let Err(err) = sent {
                tracing::warn!(%player, error = %err, "delivery failed");
                failure.get_or_insert(err);
            }
        }

        match failure {
            Some(source) => Err(EngineError::Delivery { player, source }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_answers_count_as_timeouts() {
        let limit = Duration::from_secs(10);
        assert_eq!(Verdict::judge(true, Duration::from_secs(3), limit), Verdict::Correct);
        assert_eq!(Verdict::judge(false, Duration::from_secs(3), limit), Verdict::Incorrect);
        assert_eq!(Verdict::judge(true, Duration::from_millis(10_001), limit), Verdict::TimedOut);
    }

    #[test]
    fn speed_thresholds() {
        let limit = Duration::from_secs(20);
        assert_eq!(Speed::classify(Duration::from_secs(10), limit), Speed::Fast);
        assert_eq!(Speed::classify(Duration::from_secs(15), limit), Speed::Good);
        assert_eq!(Speed::classify(Duration::from_secs(16), limit), Speed::Normal);
    }

    #[test]
    fn achievements_follow_session_percentage() {
        assert_eq!(Achievement::from_percentage(100.0), Achievement::Perfect);
        assert_eq!(Achievement::from_percentage(80.0), Achievement::Excellent);
        assert_eq!(Achievement::from_percentage(66.7), Achievement::Good);
        assert_eq!(Achievement::from_percentage(59.9), Achievement::None);
    }
}
