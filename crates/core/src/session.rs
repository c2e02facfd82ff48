//! Conversation Orchestrator
//!
//! [`Orchestrator`] creates training sessions; [`TrainingSession`] owns the
//! per-session state machine and sequences every call into the
//! [`TrainingBackend`].
//!
//! Session state lives behind a short synchronous lock that is never held
//! across an `.await`, so snapshots and cancellation keep working while a
//! backend call is outstanding. At most one call chain runs per session;
//! overlapping submissions are refused with [`SessionError::Busy`].

use crate::{
    advice::CoachAdvice,
    catalog::Scenario,
    error::{AdapterError, EvaluationError, SessionError},
    llm_client::TrainingBackend,
    prompt::{PromptTemplates, conversation_messages},
    report::EvaluationReport,
    stage::{Stage, StagePolicy},
    turn::{Speaker, Turn},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tokio::sync::oneshot;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Lifecycle of a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting trainee turns.
    #[default]
    Active,
    /// Intake frozen while the evaluation report is requested.
    Evaluating,
    /// Report stored; the session is read-only.
    Finished,
}

/// A point-in-time copy of a session's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub scenario: Scenario,
    pub stage: Stage,
    pub status: SessionStatus,
    pub turns: Vec<Turn>,
    pub advice: CoachAdvice,
    pub report: Option<EvaluationReport>,
    /// Whether a backend call is outstanding.
    pub busy: bool,
}

/// Result of an accepted trainee turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    pub advice: CoachAdvice,
    pub stage: Stage,
}

/// Shared dependencies for creating and driving sessions.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn TrainingBackend>,
    prompts: Arc<PromptTemplates>,
    policy: StagePolicy,
    call_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn TrainingBackend>, prompts: Arc<PromptTemplates>) -> Self {
        Self {
            backend,
            prompts,
            policy: StagePolicy::default(),
            call_timeout: None,
        }
    }

    pub fn with_policy(mut self, policy: StagePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bounds every backend call; `None` waits indefinitely.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Starts a session: asks the backend for the customer's opening line.
    ///
    /// No session exists unless the opening call succeeds.
    #[instrument(skip_all, fields(industry = %scenario.industry.id, persona = %scenario.persona.id))]
    pub async fn start_session(&self, scenario: Scenario) -> Result<TrainingSession, SessionError> {
        let opening = self.prompts.opening(&scenario);
        let history = conversation_messages(&opening, &[]);
        let line = self
            .with_timeout(
                self.backend
                    .customer_reply(&scenario, Stage::Explore, &history),
            )
            .await
            .inspect_err(|e| warn!(error = %e, "Opening line request failed"))?;

        let session = TrainingSession {
            id: Uuid::new_v4(),
            orchestrator: self.clone(),
            scenario,
            opening,
            state: Mutex::new(SessionState::new()),
        };
        session.lock().push(Speaker::Customer, line);
        info!(session_id = %session.id, "Training session started");
        Ok(session)
    }

    async fn with_timeout<T, E>(&self, call: impl Future<Output = Result<T, E>>) -> Result<T, E>
    where
        E: From<AdapterError>,
    {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(AdapterError::Timeout(limit).into())),
            None => call.await,
        }
    }
}

struct SessionState {
    stage: Stage,
    turns: Vec<Turn>,
    advice: CoachAdvice,
    report: Option<EvaluationReport>,
    status: SessionStatus,
    in_flight: Option<InFlight>,
    last_activity: Instant,
}

/// Marker for an outstanding call chain.
struct InFlight {
    /// Taken by [`TrainingSession::cancel`].
    cancel: Option<oneshot::Sender<()>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            stage: Stage::Explore,
            turns: Vec::new(),
            advice: CoachAdvice::placeholder(),
            report: None,
            status: SessionStatus::Active,
            in_flight: None,
            last_activity: Instant::now(),
        }
    }

    fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        let turn = Turn {
            speaker,
            text: text.into(),
            sequence: self.turns.len() + 1,
            stage: self.stage,
            at: Utc::now(),
        };
        self.turns.push(turn);
        self.last_activity = Instant::now();
    }

    /// Claims the session for one call chain.
    fn begin_call(&mut self) -> Result<oneshot::Receiver<()>, SessionError> {
        if self.status == SessionStatus::Finished {
            return Err(SessionError::Finished);
        }
        if self.in_flight.is_some() {
            return Err(SessionError::Busy);
        }
        let (tx, rx) = oneshot::channel();
        self.in_flight = Some(InFlight { cancel: Some(tx) });
        Ok(rx)
    }

    /// Closes the cancel window before a call chain commits its results.
    ///
    /// Fails when [`TrainingSession::cancel`] already took the signal, even
    /// if the backend answered before the signal was observed.
    fn seal(&mut self) -> Result<(), AdapterError> {
        match self.in_flight.as_mut().map(|f| f.cancel.take()) {
            Some(Some(_)) => Ok(()),
            _ => Err(AdapterError::Cancelled),
        }
    }
}

/// Releases the in-flight claim when a call chain ends, however it ends.
///
/// Unless disarmed, turns appended during the chain are removed, so a
/// cancelled or abandoned call leaves the session as it was before.
struct CallGuard<'a> {
    state: &'a Mutex<SessionState>,
    checkpoint: usize,
    rollback: bool,
}

impl<'a> CallGuard<'a> {
    fn new(state: &'a Mutex<SessionState>, checkpoint: usize) -> Self {
        Self {
            state,
            checkpoint,
            rollback: true,
        }
    }

    /// Keeps appended turns unless the chain was cancelled.
    fn settle(&mut self, error: &AdapterError) {
        self.rollback = *error == AdapterError::Cancelled;
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = None;
        if state.status == SessionStatus::Evaluating {
            state.status = SessionStatus::Active;
        }
        if self.rollback && state.turns.len() > self.checkpoint {
            warn!(
                removed = state.turns.len() - self.checkpoint,
                "Rolling back turns of an interrupted call"
            );
            state.turns.truncate(self.checkpoint);
        }
    }
}

/// One trainee's conversation with a simulated customer.
pub struct TrainingSession {
    id: Uuid,
    orchestrator: Orchestrator,
    scenario: Scenario,
    /// Instruction that produced the opening line; replayed as the first
    /// history entry of every customer reply.
    opening: String,
    state: Mutex<SessionState>,
}

impl TrainingSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stage(&self) -> Stage {
        self.lock().stage
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.lock().turns.clone()
    }

    pub fn advice(&self) -> CoachAdvice {
        self.lock().advice.clone()
    }

    pub fn report(&self) -> Option<EvaluationReport> {
        self.lock().report.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Time since the log or report last changed.
    pub fn idle_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            id: self.id,
            scenario: self.scenario.clone(),
            stage: state.stage,
            status: state.status,
            turns: state.turns.clone(),
            advice: state.advice.clone(),
            report: state.report.clone(),
            busy: state.in_flight.is_some(),
        }
    }

    /// Submits a trainee reply and drives one customer/coach exchange.
    ///
    /// Blank input is rejected without touching the log. Turns appended
    /// before a backend failure are kept; the stage is only re-evaluated
    /// once the whole exchange succeeds.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub async fn submit_turn(&self, text: &str) -> Result<TurnOutcome, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let (mut cancel_rx, checkpoint, stage, history) = {
            let mut state = self.lock();
            let rx = state.begin_call()?;
            let checkpoint = state.turns.len();
            state.push(Speaker::Trainee, text);
            let history = conversation_messages(&self.opening, &state.turns);
            (rx, checkpoint, state.stage, history)
        };
        let mut guard = CallGuard::new(&self.state, checkpoint);
        let backend = &self.orchestrator.backend;

        let reply = match self
            .guarded(
                &mut cancel_rx,
                backend.customer_reply(&self.scenario, stage, &history),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Customer reply failed");
                guard.settle(&e);
                return Err(e.into());
            }
        };
        self.lock().push(Speaker::Customer, reply.clone());

        let advice = match self
            .guarded(
                &mut cancel_rx,
                backend.coach_advice(&self.scenario, stage, &reply, text),
            )
            .await
        {
            Ok(advice) => advice,
            Err(e) => {
                warn!(error = %e, "Coach advice failed");
                guard.settle(&e);
                return Err(e.into());
            }
        };

        let outcome = {
            let mut state = self.lock();
            if let Err(e) = state.seal() {
                drop(state);
                warn!("Exchange cancelled before it could be committed");
                return Err(e.into());
            }
            guard.rollback = false;
            state.advice = advice.clone();
            let previous = state.stage;
            state.stage = self
                .orchestrator
                .policy
                .advance(previous, state.turns.len());
            if state.stage != previous {
                info!(from = %previous, to = %state.stage, turns = state.turns.len(), "Stage advanced");
            }
            TurnOutcome {
                reply,
                advice,
                stage: state.stage,
            }
        };
        Ok(outcome)
    }

    /// Freezes intake and requests the evaluation report.
    ///
    /// On failure the session returns to [`SessionStatus::Active`] so the
    /// trainee can retry or keep talking.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub async fn finish(&self) -> Result<EvaluationReport, SessionError> {
        let (mut cancel_rx, turns) = {
            let mut state = self.lock();
            if state.status == SessionStatus::Finished {
                return Err(SessionError::Finished);
            }
            if state.in_flight.is_some() {
                return Err(SessionError::Busy);
            }
            if !state.turns.iter().any(|t| t.speaker == Speaker::Trainee) {
                return Err(SessionError::NothingToEvaluate);
            }
            let rx = state.begin_call()?;
            state.status = SessionStatus::Evaluating;
            (rx, state.turns.clone())
        };
        let _guard = CallGuard::new(&self.state, turns.len());

        let result: Result<EvaluationReport, EvaluationError> = self
            .guarded(&mut cancel_rx, self.orchestrator.backend.evaluation(&turns))
            .await;

        match result {
            Ok(report) => {
                let mut state = self.lock();
                if let Err(e) = state.seal() {
                    drop(state);
                    warn!("Evaluation cancelled before it could be committed");
                    return Err(EvaluationError::from(e).into());
                }
                state.report = Some(report.clone());
                state.last_activity = Instant::now();
                state.status = SessionStatus::Finished;
                info!(score = report.overall_score, "Session evaluated");
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Evaluation failed; session stays open");
                Err(e.into())
            }
        }
    }

    /// Aborts the outstanding call chain, if any.
    ///
    /// The interrupted call returns [`AdapterError::Cancelled`] and the
    /// session is restored to its state before that call. Returns `false`
    /// when nothing is outstanding or the call has already committed.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        let sender = state.in_flight.as_mut().and_then(|f| f.cancel.take());
        match sender {
            Some(tx) => {
                info!(session_id = %self.id, "Cancelling in-flight call");
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Runs a backend call under the session's timeout and cancel signal.
    async fn guarded<T, E>(
        &self,
        cancel_rx: &mut oneshot::Receiver<()>,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, E>
    where
        E: From<AdapterError>,
    {
        tokio::select! {
            result = self.orchestrator.with_timeout(call) => result,
            Ok(()) = cancel_rx => Err(AdapterError::Cancelled.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::Catalog, llm_client::MockTrainingBackend};
    use mockall::predicate::eq;

    fn scenario() -> Scenario {
        Catalog::builtin()
            .scenario("telecom", "busy_pro", None)
            .unwrap()
    }

    fn orchestrator(mock: MockTrainingBackend) -> Orchestrator {
        Orchestrator::new(Arc::new(mock), Arc::new(PromptTemplates::default()))
    }

    fn advice(comment: &str) -> CoachAdvice {
        CoachAdvice {
            comment: comment.to_string(),
            tags: vec!["同理心".to_string()],
        }
    }

    #[tokio::test]
    async fn test_start_session_records_opening_line() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .withf(|_, stage, history| *stage == Stage::Explore && history.len() == 1)
            .times(1)
            .returning(|_, _, _| Ok("网速慢成这样还收费？".to_string()));

        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        let turns = session.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker, Speaker::Customer);
        assert_eq!(turns[0].sequence, 1);
        assert_eq!(session.stage(), Stage::Explore);
        assert_eq!(session.advice(), CoachAdvice::placeholder());
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_start_session_failure_creates_nothing() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, _| Err(AdapterError::Backend("401 Unauthorized".to_string())));

        let err = orchestrator(mock).start_session(scenario()).await.err().unwrap();
        assert_eq!(
            err,
            SessionError::Adapter(AdapterError::Backend("401 Unauthorized".to_string()))
        );
    }

    #[tokio::test]
    async fn test_submit_turn_appends_exchange_and_advice() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, history| Ok(format!("reply-{}", history.len())));
        mock.expect_coach_advice()
            .with(
                mockall::predicate::always(),
                eq(Stage::Explore),
                eq("reply-3"),
                eq("您好，请问遇到了什么问题？"),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(advice("先确认需求")));

        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        let outcome = session.submit_turn("  您好，请问遇到了什么问题？ ").await.unwrap();

        assert_eq!(outcome.reply, "reply-3");
        assert_eq!(outcome.advice, advice("先确认需求"));
        let turns = session.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].speaker, Speaker::Trainee);
        assert_eq!(turns[1].text, "您好，请问遇到了什么问题？");
        assert_eq!(turns[2].speaker, Speaker::Customer);
        assert_eq!(turns[2].sequence, 3);
        assert_eq!(session.advice(), advice("先确认需求"));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_blank_submission_is_a_no_op() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .times(1)
            .returning(|_, _, _| Ok("喂？".to_string()));
        mock.expect_coach_advice().never();

        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        assert_eq!(
            session.submit_turn(" \n\t ").await.unwrap_err(),
            SessionError::EmptyInput
        );
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.stage(), Stage::Explore);
    }

    #[tokio::test]
    async fn test_stage_progression_over_exchanges() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, _| Ok("嗯".to_string()));
        mock.expect_coach_advice()
            .returning(|_, _, _, _| Ok(advice("ok")));

        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        let mut observed = vec![(session.turns().len(), session.stage())];
        for _ in 0..6 {
            session.submit_turn("好的，我来处理").await.unwrap();
            observed.push((session.turns().len(), session.stage()));
        }

        assert_eq!(
            observed,
            vec![
                (1, Stage::Explore),
                (3, Stage::Explore),
                (5, Stage::Offer),
                (7, Stage::Offer),
                (9, Stage::Action),
                (11, Stage::Action),
                (13, Stage::Confirm),
            ]
        );
        assert!(observed.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[tokio::test]
    async fn test_custom_policy_is_honoured() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, _| Ok("嗯".to_string()));
        mock.expect_coach_advice()
            .returning(|_, _, _, _| Ok(advice("ok")));

        let session = orchestrator(mock)
            .with_policy(StagePolicy::new(2, 4, 6).unwrap())
            .start_session(scenario())
            .await
            .unwrap();
        session.submit_turn("一").await.unwrap();
        assert_eq!(session.stage(), Stage::Offer);
        session.submit_turn("二").await.unwrap();
        assert_eq!(session.stage(), Stage::Action);
    }

    #[tokio::test]
    async fn test_reply_failure_keeps_trainee_turn() {
        let mut mock = MockTrainingBackend::new();
        let mut calls = 0;
        mock.expect_customer_reply().returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Ok("开场".to_string())
            } else {
                Err(AdapterError::Backend("502 Bad Gateway".to_string()))
            }
        });
        mock.expect_coach_advice().never();

        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        let err = session.submit_turn("抱歉让您久等了").await.unwrap_err();

        assert_eq!(
            err,
            SessionError::Adapter(AdapterError::Backend("502 Bad Gateway".to_string()))
        );
        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].speaker, Speaker::Trainee);
        assert_eq!(session.stage(), Stage::Explore);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_advice_failure_keeps_customer_reply() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, _| Ok("说吧".to_string()));
        mock.expect_coach_advice()
            .returning(|_, _, _, _| Err(AdapterError::EmptyResponse));

        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        let err = session.submit_turn("我先帮您查一下").await.unwrap_err();
        assert_eq!(err, SessionError::Adapter(AdapterError::EmptyResponse));
        assert_eq!(session.turns().len(), 3);
        assert_eq!(session.advice(), CoachAdvice::placeholder());
    }

    #[tokio::test]
    async fn test_finish_without_trainee_turn_is_rejected() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, _| Ok("开场".to_string()));
        mock.expect_evaluation().never();

        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        assert_eq!(
            session.finish().await.unwrap_err(),
            SessionError::NothingToEvaluate
        );
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_evaluation_failure_leaves_session_open() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, _| Ok("开场".to_string()));
        mock.expect_coach_advice()
            .returning(|_, _, _, _| Ok(advice("ok")));
        mock.expect_evaluation()
            .returning(|_| Err(EvaluationError::Malformed("expected value".to_string())));

        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        session.submit_turn("您好").await.unwrap();
        let err = session.finish().await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Evaluation(EvaluationError::Malformed(_))
        ));
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.report().is_none());
        assert!(session.submit_turn("那我们继续").await.is_ok());
    }

    /// Answers the opening line, then never answers again.
    struct Stalled;

    #[async_trait::async_trait]
    impl TrainingBackend for Stalled {
        async fn customer_reply(
            &self,
            _: &Scenario,
            _: Stage,
            history: &[crate::turn::ChatMessage],
        ) -> Result<String, AdapterError> {
            if history.len() > 1 {
                std::future::pending::<()>().await;
            }
            Ok("开场".to_string())
        }

        async fn coach_advice(
            &self,
            _: &Scenario,
            _: Stage,
            _: &str,
            _: &str,
        ) -> Result<CoachAdvice, AdapterError> {
            Ok(CoachAdvice::placeholder())
        }

        async fn evaluation(&self, _: &[Turn]) -> Result<EvaluationReport, EvaluationError> {
            std::future::pending::<()>().await;
            Err(EvaluationError::Malformed("unreachable".to_string()))
        }
    }

    fn stalled() -> Orchestrator {
        Orchestrator::new(Arc::new(Stalled), Arc::new(PromptTemplates::default()))
    }

    async fn wait_until_busy(session: &TrainingSession) {
        while !session.is_busy() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_adapter_error() {
        let limit = Duration::from_millis(20);
        let session = stalled()
            .with_call_timeout(Some(limit))
            .start_session(scenario())
            .await
            .unwrap();

        let err = session.submit_turn("请稍等").await.unwrap_err();
        assert_eq!(err, SessionError::Adapter(AdapterError::Timeout(limit)));
        assert_eq!(session.turns().len(), 2);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_overlapping_submission_is_busy_and_cancel_rolls_back() {
        let session = stalled().start_session(scenario()).await.unwrap();

        let (first, ()) = tokio::join!(session.submit_turn("第一句"), async {
            wait_until_busy(&session).await;
            assert!(session.snapshot().busy);
            assert_eq!(
                session.submit_turn("第二句").await.unwrap_err(),
                SessionError::Busy
            );
            assert_eq!(session.finish().await.unwrap_err(), SessionError::Busy);
            assert!(session.cancel());
            assert!(!session.cancel());
        });

        assert_eq!(
            first.unwrap_err(),
            SessionError::Adapter(AdapterError::Cancelled)
        );
        let turns = session.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker, Speaker::Customer);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_cancelled_evaluation_returns_to_active() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, _| Ok("开场".to_string()));
        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        // Swap in a backend whose evaluation never completes.
        let session = TrainingSession {
            orchestrator: stalled(),
            ..session
        };
        session.lock().push(Speaker::Trainee, "您好");

        let (result, ()) = tokio::join!(session.finish(), async {
            wait_until_busy(&session).await;
            assert_eq!(session.status(), SessionStatus::Evaluating);
            assert!(session.cancel());
        });

        assert_eq!(
            result.unwrap_err(),
            SessionError::Evaluation(EvaluationError::Backend(AdapterError::Cancelled))
        );
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_submission_releases_session() {
        let session = stalled().start_session(scenario()).await.unwrap();

        tokio::select! {
            _ = session.submit_turn("喂？") => panic!("stalled backend answered"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }

        assert!(!session.is_busy());
        assert_eq!(session.turns().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_session_rejects_further_work() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, _| Ok("开场".to_string()));
        mock.expect_coach_advice()
            .returning(|_, _, _, _| Ok(advice("ok")));
        mock.expect_evaluation().times(1).returning(|turns| {
            assert_eq!(turns.len(), 3);
            Ok(serde_json::from_value(serde_json::json!({
                "overallScore": 80, "empathy": 80, "logic": 80, "efficiency": 80,
                "compliance": 80, "professionalism": 80, "summary": "不错",
                "keyMoments": []
            }))
            .unwrap())
        });

        let session = orchestrator(mock).start_session(scenario()).await.unwrap();
        session.submit_turn("您好").await.unwrap();
        let report = session.finish().await.unwrap();

        assert_eq!(report.overall_score, 80.0);
        assert_eq!(session.status(), SessionStatus::Finished);
        assert_eq!(session.report(), Some(report));
        assert_eq!(session.finish().await.unwrap_err(), SessionError::Finished);
        assert_eq!(
            session.submit_turn("还在吗").await.unwrap_err(),
            SessionError::Finished
        );
        assert_eq!(session.turns().len(), 3);
    }

    #[test]
    fn test_cancel_without_call_is_noop() {
        let session = TrainingSession {
            id: Uuid::new_v4(),
            orchestrator: orchestrator(MockTrainingBackend::new()),
            scenario: scenario(),
            opening: String::new(),
            state: Mutex::new(SessionState::new()),
        };
        assert!(!session.cancel());
        assert!(session.turns().is_empty());
        assert_eq!(session.stage(), Stage::Explore);
    }

    fn idle_session() -> TrainingSession {
        TrainingSession {
            id: Uuid::new_v4(),
            orchestrator: orchestrator(MockTrainingBackend::new()),
            scenario: scenario(),
            opening: String::new(),
            state: Mutex::new(SessionState::new()),
        }
    }

    #[test]
    fn test_cancel_taken_before_commit_blocks_commit() {
        let session = idle_session();
        let _rx = session.lock().begin_call().unwrap();
        assert!(session.cancel());
        assert_eq!(session.lock().seal(), Err(AdapterError::Cancelled));
    }

    #[test]
    fn test_committing_call_cannot_be_cancelled() {
        let session = idle_session();
        let _rx = session.lock().begin_call().unwrap();
        assert_eq!(session.lock().seal(), Ok(()));
        assert!(!session.cancel());
        assert!(session.is_busy());
    }

    /// Cancels its own session from inside the advice call, then answers
    /// anyway, so the answer and the cancel signal are ready together.
    struct CancelsDuringAdvice {
        session: Arc<std::sync::OnceLock<std::sync::Weak<TrainingSession>>>,
    }

    #[async_trait::async_trait]
    impl TrainingBackend for CancelsDuringAdvice {
        async fn customer_reply(
            &self,
            _: &Scenario,
            _: Stage,
            _: &[crate::turn::ChatMessage],
        ) -> Result<String, AdapterError> {
            Ok("说吧".to_string())
        }

        async fn coach_advice(
            &self,
            _: &Scenario,
            _: Stage,
            _: &str,
            _: &str,
        ) -> Result<CoachAdvice, AdapterError> {
            if let Some(session) = self.session.get().and_then(std::sync::Weak::upgrade) {
                assert!(session.cancel());
            }
            Ok(advice("来不及了"))
        }

        async fn evaluation(&self, _: &[Turn]) -> Result<EvaluationReport, EvaluationError> {
            Err(EvaluationError::Malformed("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cancel_racing_a_finished_call_still_rolls_back() {
        let slot = Arc::new(std::sync::OnceLock::new());
        let backend = CancelsDuringAdvice {
            session: slot.clone(),
        };
        let session = Arc::new(
            Orchestrator::new(Arc::new(backend), Arc::new(PromptTemplates::default()))
                .start_session(scenario())
                .await
                .unwrap(),
        );
        slot.set(Arc::downgrade(&session)).unwrap();

        let err = session.submit_turn("我马上处理").await.unwrap_err();

        assert_eq!(err, SessionError::Adapter(AdapterError::Cancelled));
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.advice(), CoachAdvice::placeholder());
        assert!(!session.is_busy());
        assert!(!session.cancel());
    }

    #[tokio::test]
    async fn test_activity_resets_idle_clock() {
        let mut mock = MockTrainingBackend::new();
        mock.expect_customer_reply()
            .returning(|_, _, _| Ok("嗯".to_string()));
        mock.expect_coach_advice()
            .returning(|_, _, _, _| Ok(advice("ok")));
        let session = orchestrator(mock).start_session(scenario()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let before = session.idle_for();
        assert!(before >= Duration::from_millis(30));
        session.submit_turn("您好").await.unwrap();
        assert!(session.idle_for() < before);
    }
}
