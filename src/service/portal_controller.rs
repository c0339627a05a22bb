use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::ResearchBackend;
use crate::errors::{AppError, ResearchError};
use crate::models::{
    Attachment, AttachmentSummary, PortalEvent, ResearchAnswer, SessionView, Turn, TurnView,
};
use crate::service::attachment_encoder::{AttachmentEncoder, RawFile};
use crate::service::session_gate::{CredentialVerifier, GateOutcome, SessionGate};
use crate::store::conversation_store::ConversationStore;

const EVENT_CAPACITY: usize = 64;

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct PortalDeps {
    pub research: Arc<dyn ResearchBackend>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub encoder: AttachmentEncoder,
    pub research_timeout: Duration,
}

struct PortalState {
    gate: SessionGate,
    store: ConversationStore,
    pending: Option<Attachment>,
    /// Bumped on every selection, clear and submit; an encode only lands if
    /// the generation it started with is still current.
    selection: u64,
    /// Bumped on unlock and lock; replies from an older epoch are dropped.
    epoch: u64,
    loading: bool,
}

impl PortalState {
    fn reset_conversation(&mut self) {
        self.epoch += 1;
        self.selection += 1;
        self.store.reset();
        self.pending = None;
        self.loading = false;
    }
}

/// One portal session: gate, history, pending attachment and the in-flight turn.
pub struct PortalController {
    id: Uuid,
    state: Mutex<PortalState>,
    flight: tokio::sync::Mutex<()>,
    cancel: Notify,
    research: Arc<dyn ResearchBackend>,
    encoder: AttachmentEncoder,
    research_timeout: Duration,
    events: broadcast::Sender<PortalEvent>,
}

impl PortalController {
    pub fn new(deps: PortalDeps) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(PortalState {
                gate: SessionGate::new(deps.verifier),
                store: ConversationStore::new(),
                pending: None,
                selection: 0,
                epoch: 0,
                loading: false,
            }),
            flight: tokio::sync::Mutex::new(()),
            cancel: Notify::new(),
            research: deps.research,
            encoder: deps.encoder,
            research_timeout: deps.research_timeout,
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.events.subscribe()
    }

    fn state(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called with the state lock held so subscribers see events in state order.
    fn emit(&self, event: PortalEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Gate ─────────────────────────────────────────────────────────────────

    /// A successful unlock always starts from an empty conversation.
    pub fn unlock(&self, credential: &str) -> Result<(), AppError> {
        let mut st = self.state();
        match st.gate.submit_credential(credential) {
            GateOutcome::Unlocked => {
                st.reset_conversation();
                self.cancel.notify_waiters();
                self.emit(PortalEvent::Unlocked);
                info!(session = %self.id, "Research portal unlocked");
                Ok(())
            }
            GateOutcome::Rejected { reason } => Err(AppError::AccessDenied { reason }),
        }
    }

    /// Discards the conversation and cancels any in-flight research call.
    pub fn lock(&self) {
        let mut st = self.state();
        st.gate.lock();
        if !st.store.is_empty() {
            debug!(session = %self.id, discarded_turns = st.store.len(), "Discarding conversation");
        }
        st.reset_conversation();
        self.cancel.notify_waiters();
        self.emit(PortalEvent::Locked);
        info!(session = %self.id, "Research portal locked");
    }

    pub fn is_unlocked(&self) -> bool {
        self.state().gate.is_unlocked()
    }

    // ── Pending attachment ───────────────────────────────────────────────────

    /// Replaces the pending attachment. The last selection wins: an encode that
    /// finishes after a newer selection, a clear or a submit is thrown away.
    /// Returns whatever is pending once this selection has settled.
    pub async fn select_attachment(
        &self,
        selection: Option<RawFile>,
    ) -> Result<Option<AttachmentSummary>, AppError> {
        let generation = {
            let mut st = self.state();
            if !st.gate.is_unlocked() {
                return Err(AppError::SessionLocked);
            }
            st.selection += 1;
            if st.pending.take().is_some() {
                self.emit(PortalEvent::AttachmentPending { attachment: None });
            }
            st.selection
        };

        let encoded = self.encoder.encode(selection).await;

        let mut st = self.state();
        if st.selection != generation {
            debug!(session = %self.id, "Discarding superseded attachment selection");
            encoded?;
            return Ok(st.pending.as_ref().map(Attachment::summary));
        }

        let attachment = encoded?;
        let summary = attachment.as_ref().map(Attachment::summary);
        if attachment.is_some() {
            st.pending = attachment;
            self.emit(PortalEvent::AttachmentPending { attachment: summary.clone() });
        }
        Ok(summary)
    }

    pub fn clear_attachment(&self) {
        let mut st = self.state();
        st.selection += 1;
        if st.pending.take().is_some() {
            self.emit(PortalEvent::AttachmentPending { attachment: None });
        }
    }

    #[cfg(test)]
    pub fn pending_attachment(&self) -> Option<AttachmentSummary> {
        self.state().pending.as_ref().map(Attachment::summary)
    }

    // ── Conversation ─────────────────────────────────────────────────────────

    /// Sends one turn with the pending attachment.
    ///
    /// Returns the appended assistant turn, or `None` when the session was
    /// locked or re-unlocked while the call was in flight. Research failures
    /// are never errors here; they arrive as assistant turns.
    pub async fn submit(&self, query: &str) -> Result<Option<Arc<Turn>>, AppError> {
        let _flight = self.flight.try_lock().map_err(|_| AppError::SubmissionInFlight)?;

        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        let (epoch, prior, attachment) = {
            let mut st = self.state();
            if !st.gate.is_unlocked() {
                return Err(AppError::SessionLocked);
            }
            if query.trim().is_empty() && st.pending.is_none() {
                return Err(AppError::EmptySubmission);
            }

            let prior = st.store.snapshot();
            let attachment = st.pending.take();
            st.selection += 1;
            let content = match &attachment {
                Some(file) if query.trim().is_empty() => {
                    format!("Shared a file: {}", file.display_name)
                }
                _ => query.to_string(),
            };
            let user_turn = st.store.append(Turn::user(content, attachment.clone()));
            st.loading = true;

            self.emit(PortalEvent::TurnAppended { turn: TurnView::from(user_turn.as_ref()) });
            if attachment.is_some() {
                self.emit(PortalEvent::AttachmentPending { attachment: None });
            }
            self.emit(PortalEvent::Loading { active: true });
            (st.epoch, prior, attachment)
        };

        debug!(session = %self.id, prior_turns = prior.len(), "Dispatching research turn");
        let ask = self.research.ask(query, &prior, attachment.as_ref());
        let answer = tokio::select! {
            _ = &mut cancelled => {
                info!(session = %self.id, "Research turn cancelled by session reset");
                return Ok(None);
            }
            outcome = tokio::time::timeout(self.research_timeout, ask) => match outcome {
                Ok(answer) => answer,
                Err(_) => {
                    let seconds = self.research_timeout.as_secs();
                    warn!(session = %self.id, seconds, "Research call timed out");
                    ResearchAnswer::from(ResearchError::TimedOut { seconds })
                }
            },
        };

        let mut st = self.state();
        if st.epoch != epoch {
            info!(session = %self.id, "Dropping reply for a conversation that was reset");
            return Ok(None);
        }
        let assistant = st.store.append(Turn::assistant(answer));
        st.loading = false;
        self.emit(PortalEvent::TurnAppended { turn: TurnView::from(assistant.as_ref()) });
        self.emit(PortalEvent::Loading { active: false });
        Ok(Some(assistant))
    }

    pub fn snapshot(&self) -> Vec<Arc<Turn>> {
        self.state().store.snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    pub fn view(&self) -> SessionView {
        let st = self.state();
        SessionView {
            session_id: self.id,
            unlocked: st.gate.is_unlocked(),
            loading: st.loading,
            pending_attachment: st.pending.as_ref().map(Attachment::summary),
            turns: st.store.snapshot().iter().map(|t| TurnView::from(t.as_ref())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::models::{Citation, ResearchErrorKind, Role};
    use crate::service::session_gate::AccessCodeVerifier;

    #[derive(Debug, Clone)]
    struct RecordedCall {
        query: String,
        history: Vec<String>,
        attachment: Option<String>,
    }

    #[derive(Default)]
    struct ScriptedBackend {
        calls: Mutex<Vec<RecordedCall>>,
        hold: Option<Arc<Semaphore>>,
        delay: Option<Duration>,
        failure: Option<ResearchErrorKind>,
    }

    impl ScriptedBackend {
        fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResearchBackend for ScriptedBackend {
        async fn ask(
            &self,
            query: &str,
            history: &[Arc<Turn>],
            attachment: Option<&Attachment>,
        ) -> ResearchAnswer {
            self.calls.lock().unwrap().push(RecordedCall {
                query: query.to_string(),
                history: history.iter().map(|t| t.content.clone()).collect(),
                attachment: attachment.map(|a| a.display_name.clone()),
            });
            if let Some(hold) = &self.hold {
                let _permit = hold.acquire().await.expect("semaphore open");
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(kind) = self.failure {
                return ResearchAnswer::failed(kind, "Error: Research capacity limit reached.");
            }
            ResearchAnswer::grounded(
                format!("answer to {query}"),
                vec![Citation::new("https://www.un.org", Some("United Nations".into()))],
            )
        }
    }

    fn controller_with(backend: Arc<ScriptedBackend>, timeout: Duration) -> Arc<PortalController> {
        Arc::new(PortalController::new(PortalDeps {
            research: backend,
            verifier: Arc::new(AccessCodeVerifier::new(["MUN2025", "MUN2026"])),
            encoder: AttachmentEncoder::new(1024),
            research_timeout: timeout,
        }))
    }

    fn unlocked(backend: Arc<ScriptedBackend>) -> Arc<PortalController> {
        let controller = controller_with(backend, Duration::from_secs(60));
        controller.unlock("MUN2025").expect("unlock");
        controller
    }

    fn file(name: &str) -> RawFile {
        RawFile::new(name, Some("image/png".into()), vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn wait_for_loading(events: &mut broadcast::Receiver<PortalEvent>) {
        loop {
            if let PortalEvent::Loading { active: true } = events.recv().await.expect("event") {
                return;
            }
        }
    }

    #[tokio::test]
    async fn every_submission_adds_a_user_and_an_assistant_turn_in_order() {
        let backend = Arc::new(ScriptedBackend::default());
        let controller = unlocked(backend.clone());

        let queries = ["Veto?", "P5 members?", "Reform proposals?"];
        for (n, query) in queries.iter().enumerate() {
            controller.submit(query).await.unwrap().expect("assistant turn");
            assert_eq!(controller.snapshot().len(), 2 * (n + 1));
        }

        let roles: Vec<_> = controller.snapshot().iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant].repeat(3));
        let contents: Vec<_> = controller.snapshot().iter().map(|t| t.content.clone()).collect();
        assert_eq!(contents[0], "Veto?");
        assert_eq!(contents[3], "answer to P5 members?");

        let calls = backend.calls();
        assert!(calls[0].history.is_empty());
        assert_eq!(calls[1].history, vec!["Veto?", "answer to Veto?"]);
        assert_eq!(
            calls[2].history,
            vec!["Veto?", "answer to Veto?", "P5 members?", "answer to P5 members?"]
        );
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn security_council_scenario() {
        let controller = unlocked(Arc::new(ScriptedBackend::default()));
        let assistant = controller
            .submit("What is the UN Security Council veto?")
            .await
            .unwrap()
            .unwrap();

        let turns = controller.snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "What is the UN Security Council veto?");
        assert!(turns[0].attachment.is_none());
        assert_eq!(assistant.role, Role::Assistant);
        assert!(!assistant.content.is_empty());
        assert_eq!(assistant.citations[0].label(), "United Nations");
    }

    #[tokio::test]
    async fn blank_submission_is_a_no_op() {
        let backend = Arc::new(ScriptedBackend::default());
        let controller = unlocked(backend.clone());
        let mut events = controller.subscribe();

        let err = controller.submit("   \n").await.unwrap_err();
        assert!(matches!(err, AppError::EmptySubmission));
        assert!(controller.snapshot().is_empty());
        assert!(controller.pending_attachment().is_none());
        assert!(!controller.is_loading());
        assert!(backend.calls().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn locked_session_refuses_submissions() {
        let controller = controller_with(Arc::new(ScriptedBackend::default()), Duration::from_secs(5));
        let err = controller.submit("hello").await.unwrap_err();
        assert!(matches!(err, AppError::SessionLocked));
        assert!(controller.select_attachment(Some(file("a.png"))).await.is_err());
    }

    #[tokio::test]
    async fn access_key_is_trimmed_and_case_folded() {
        let controller = controller_with(Arc::new(ScriptedBackend::default()), Duration::from_secs(5));

        let err = controller.unlock("mun2024").unwrap_err();
        assert!(matches!(err, AppError::AccessDenied { .. }));
        assert!(!controller.is_unlocked());
        assert!(controller.snapshot().is_empty());

        controller.unlock(" mun2025 ").unwrap();
        assert!(controller.is_unlocked());
    }

    #[tokio::test]
    async fn unlocking_again_starts_a_fresh_conversation() {
        let controller = unlocked(Arc::new(ScriptedBackend::default()));
        controller.submit("first").await.unwrap();
        assert_eq!(controller.snapshot().len(), 2);

        controller.unlock("MUN2026").unwrap();
        assert!(controller.snapshot().is_empty());
    }

    #[tokio::test]
    async fn lock_discards_history_and_pending_attachment() {
        let controller = unlocked(Arc::new(ScriptedBackend::default()));
        controller.submit("first").await.unwrap();
        controller.select_attachment(Some(file("a.png"))).await.unwrap();

        controller.lock();
        assert!(!controller.is_unlocked());
        assert!(controller.snapshot().is_empty());
        assert!(controller.pending_attachment().is_none());
    }

    #[tokio::test]
    async fn later_selection_replaces_pending_attachment() {
        let backend = Arc::new(ScriptedBackend::default());
        let controller = unlocked(backend.clone());

        controller.select_attachment(Some(file("a.png"))).await.unwrap();
        let pending = controller.select_attachment(Some(file("b.png"))).await.unwrap();
        assert_eq!(pending.unwrap().display_name, "b.png");
        assert_eq!(controller.pending_attachment().unwrap().display_name, "b.png");

        controller.submit("").await.unwrap();
        let turns = controller.snapshot();
        assert_eq!(turns[0].content, "Shared a file: b.png");
        assert_eq!(turns[0].attachment.as_ref().unwrap().display_name, "b.png");
        assert_eq!(backend.calls()[0].attachment.as_deref(), Some("b.png"));
        assert!(controller.pending_attachment().is_none());
    }

    #[tokio::test]
    async fn superseded_encode_is_discarded() {
        let controller = unlocked(Arc::new(ScriptedBackend::default()));

        let (first, second) = tokio::join!(
            controller.select_attachment(Some(file("a.png"))),
            controller.select_attachment(Some(file("b.png"))),
        );
        first.unwrap();
        assert_eq!(second.unwrap().unwrap().display_name, "b.png");
        assert_eq!(controller.pending_attachment().unwrap().display_name, "b.png");
    }

    #[tokio::test]
    async fn failed_encode_leaves_no_attachment() {
        let controller = unlocked(Arc::new(ScriptedBackend::default()));
        controller.select_attachment(Some(file("a.png"))).await.unwrap();

        let err = controller
            .select_attachment(Some(RawFile::new("empty.pdf", None, vec![])))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(controller.pending_attachment().is_none());
    }

    #[tokio::test]
    async fn text_and_attachment_are_sent_together() {
        let backend = Arc::new(ScriptedBackend::default());
        let controller = unlocked(backend.clone());
        controller.select_attachment(Some(file("chart.png"))).await.unwrap();

        controller.submit("Explain this chart").await.unwrap();
        let turns = controller.snapshot();
        assert_eq!(turns[0].content, "Explain this chart");
        assert_eq!(backend.calls()[0].query, "Explain this chart");
        assert_eq!(backend.calls()[0].attachment.as_deref(), Some("chart.png"));
    }

    #[tokio::test]
    async fn second_submission_is_rejected_while_one_is_in_flight() {
        let hold = Arc::new(Semaphore::new(0));
        let backend = Arc::new(ScriptedBackend { hold: Some(hold.clone()), ..Default::default() });
        let controller = unlocked(backend);
        let mut events = controller.subscribe();

        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.submit("first").await }
        });
        wait_for_loading(&mut events).await;

        let err = controller.submit("second").await.unwrap_err();
        assert!(matches!(err, AppError::SubmissionInFlight));
        assert_eq!(controller.snapshot().len(), 1);

        hold.add_permits(1);
        first.await.unwrap().unwrap().expect("assistant turn");
        let contents: Vec<_> = controller.snapshot().iter().map(|t| t.content.clone()).collect();
        assert_eq!(contents, vec!["first", "answer to first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_times_out_into_an_assistant_turn() {
        let backend = Arc::new(ScriptedBackend {
            delay: Some(Duration::from_secs(3600)),
            ..Default::default()
        });
        let controller = controller_with(backend, Duration::from_secs(30));
        controller.unlock("MUN2025").unwrap();

        let assistant = controller.submit("slow").await.unwrap().unwrap();
        assert_eq!(assistant.failure, Some(ResearchErrorKind::TimedOut));
        assert!(assistant.content.contains("30 seconds"));
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn locking_mid_flight_cancels_and_drops_the_reply() {
        let hold = Arc::new(Semaphore::new(0));
        let backend = Arc::new(ScriptedBackend { hold: Some(hold), ..Default::default() });
        let controller = unlocked(backend);
        let mut events = controller.subscribe();

        let pending = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.submit("never answered").await }
        });
        wait_for_loading(&mut events).await;

        controller.lock();
        assert_eq!(pending.await.unwrap().unwrap(), None);
        assert!(controller.snapshot().is_empty());
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn failures_render_as_assistant_turns() {
        let backend = Arc::new(ScriptedBackend {
            failure: Some(ResearchErrorKind::QuotaExceeded),
            ..Default::default()
        });
        let controller = unlocked(backend);

        let assistant = controller.submit("anything").await.unwrap().unwrap();
        assert_eq!(assistant.failure, Some(ResearchErrorKind::QuotaExceeded));
        assert!(assistant.citations.is_empty());
        assert_eq!(controller.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn events_follow_the_turn_lifecycle() {
        let controller = unlocked(Arc::new(ScriptedBackend::default()));
        let mut events = controller.subscribe();

        controller.submit("Veto?").await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), 4);
        assert!(matches!(&seen[0], PortalEvent::TurnAppended { turn } if turn.role == Role::User));
        assert!(matches!(seen[1], PortalEvent::Loading { active: true }));
        assert!(matches!(&seen[2], PortalEvent::TurnAppended { turn } if turn.role == Role::Assistant));
        assert!(matches!(seen[3], PortalEvent::Loading { active: false }));
    }
}
