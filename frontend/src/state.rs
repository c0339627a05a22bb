use leptos::prelude::*;
use leptos::task::spawn_local;
use web_sys::File;

use crate::api;
use crate::models::{AttachmentSummary, PortalEvent, SessionView, Turn};
use crate::ws;

/// Portal state mirrored from the server, provided via Leptos context.
#[derive(Clone, Copy)]
pub struct PortalState {
    // --- Read signals (for components to subscribe to) ---
    pub session_id: ReadSignal<Option<String>>,
    pub unlocked: ReadSignal<bool>,
    pub turns: ReadSignal<Vec<Turn>>,
    pub loading: ReadSignal<bool>,
    pub pending_attachment: ReadSignal<Option<AttachmentSummary>>,
    pub uploading: ReadSignal<bool>,
    pub gate_error: ReadSignal<Option<String>>,
    pub error: ReadSignal<Option<String>>,

    // --- Write signals (for mutating state) ---
    set_session_id: WriteSignal<Option<String>>,
    set_unlocked: WriteSignal<bool>,
    set_turns: WriteSignal<Vec<Turn>>,
    set_loading: WriteSignal<bool>,
    set_pending_attachment: WriteSignal<Option<AttachmentSummary>>,
    set_uploading: WriteSignal<bool>,
    set_gate_error: WriteSignal<Option<String>>,
    set_error: WriteSignal<Option<String>>,
}

impl PortalState {
    /// Create a new `PortalState` and provide it in the current Leptos context.
    pub fn provide() -> Self {
        let (session_id, set_session_id) = signal(None::<String>);
        let (unlocked, set_unlocked) = signal(false);
        let (turns, set_turns) = signal(Vec::<Turn>::new());
        let (loading, set_loading) = signal(false);
        let (pending_attachment, set_pending_attachment) = signal(None::<AttachmentSummary>);
        let (uploading, set_uploading) = signal(false);
        let (gate_error, set_gate_error) = signal(None::<String>);
        let (error, set_error) = signal(None::<String>);

        let state = Self {
            session_id,
            unlocked,
            turns,
            loading,
            pending_attachment,
            uploading,
            gate_error,
            error,
            set_session_id,
            set_unlocked,
            set_turns,
            set_loading,
            set_pending_attachment,
            set_uploading,
            set_gate_error,
            set_error,
        };

        provide_context(state);
        state
    }

    fn apply_view(&self, view: SessionView) {
        self.set_unlocked.set(view.unlocked);
        self.set_loading.set(view.loading);
        self.set_pending_attachment.set(view.pending_attachment);
        self.set_turns.set(view.turns);
    }

    fn push_turn(&self, turn: Turn) {
        self.set_turns.update(|turns| merge_turn(turns, turn));
    }

    fn apply_event(&self, event: PortalEvent) {
        match event {
            PortalEvent::Snapshot { session } => self.apply_view(session),
            PortalEvent::Unlocked => {
                self.set_unlocked.set(true);
                self.set_turns.set(Vec::new());
                self.set_pending_attachment.set(None);
                self.set_gate_error.set(None);
            }
            PortalEvent::Locked => {
                self.set_unlocked.set(false);
                self.set_turns.set(Vec::new());
                self.set_pending_attachment.set(None);
                self.set_loading.set(false);
            }
            PortalEvent::TurnAppended { turn } => self.push_turn(turn),
            PortalEvent::Loading { active } => self.set_loading.set(active),
            PortalEvent::AttachmentPending { attachment } => {
                self.set_pending_attachment.set(attachment)
            }
        }
    }

    /// Opens a session and subscribes to its live events.
    pub fn start_session(&self) {
        let state = *self;
        spawn_local(async move {
            match api::create_session().await {
                Ok(view) => {
                    let id = view.session_id.clone();
                    state.set_session_id.set(Some(id.clone()));
                    state.apply_view(view);
                    ws::subscribe(
                        &id,
                        move |event| state.apply_event(event),
                        move |err| state.set_error.set(Some(err)),
                    );
                }
                Err(e) => {
                    log::error!("Failed to open portal session: {e}");
                    state.set_gate_error.set(Some(e));
                }
            }
        });
    }

    pub fn unlock(&self, access_key: String) {
        let state = *self;
        let Some(id) = self.session_id.get_untracked() else { return };
        spawn_local(async move {
            match api::unlock(&id, &access_key).await {
                Ok(view) => {
                    state.set_gate_error.set(None);
                    state.set_error.set(None);
                    state.apply_view(view);
                }
                Err(e) => state.set_gate_error.set(Some(e)),
            }
        });
    }

    pub fn lock(&self) {
        let state = *self;
        let Some(id) = self.session_id.get_untracked() else { return };
        spawn_local(async move {
            if let Err(e) = api::lock(&id).await {
                log::error!("Failed to lock session: {e}");
                state.set_error.set(Some(e));
            }
        });
    }

    /// Whether the input bar should accept a send right now.
    pub fn can_send(&self, query: &str) -> bool {
        !self.loading.get()
            && !self.uploading.get()
            && (!query.trim().is_empty() || self.pending_attachment.get().is_some())
    }

    /// Sends a research turn. Turns arrive over the event stream; once the reply
    /// is in, the session is re-read so both turns show even without the stream.
    pub fn send(&self, query: String) {
        let state = *self;
        let Some(id) = self.session_id.get_untracked() else { return };
        self.set_loading.set(true);
        self.set_error.set(None);

        spawn_local(async move {
            match api::submit(&id, &query).await {
                Ok(response) => match api::get_session(&id).await {
                    Ok(view) => state.apply_view(view),
                    Err(e) => {
                        log::warn!("Could not refresh session after reply: {e}");
                        if let Some(turn) = response.turn {
                            state.push_turn(turn);
                        }
                    }
                },
                Err(e) => {
                    log::error!("Research request failed: {e}");
                    state.set_error.set(Some(e));
                }
            }
            state.set_loading.set(false);
        });
    }

    pub fn attach(&self, file: File) {
        let state = *self;
        let Some(id) = self.session_id.get_untracked() else { return };
        self.set_uploading.set(true);
        self.set_error.set(None);

        spawn_local(async move {
            match api::upload_attachment(&id, &file).await {
                Ok(pending) => state.set_pending_attachment.set(pending),
                Err(e) => state.set_error.set(Some(e)),
            }
            state.set_uploading.set(false);
        });
    }

    pub fn clear_attachment(&self) {
        let state = *self;
        let Some(id) = self.session_id.get_untracked() else { return };
        self.set_pending_attachment.set(None);
        spawn_local(async move {
            if let Err(e) = api::clear_attachment(&id).await {
                state.set_error.set(Some(e));
            }
        });
    }
}

/// Appends `turn` unless a turn with the same id is already shown. The event
/// stream and the submit reply can both deliver the same assistant turn.
fn merge_turn(turns: &mut Vec<Turn>, turn: Turn) {
    if !turns.iter().any(|t| t.id == turn.id) {
        turns.push(turn);
    }
}
