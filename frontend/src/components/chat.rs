use leptos::ev;
use leptos::html;
use leptos::prelude::*;
use web_sys::HtmlInputElement;

use crate::models::{Citation, Turn};
use crate::state::PortalState;

/// Conversation surface: history, loading indicator and the input bar.
#[component]
pub fn ResearchChat() -> impl IntoView {
    let state = expect_context::<PortalState>();

    view! {
        <main class="chat-area">
            // Error banner
            {move || {
                state.error.get().map(|err| {
                    view! {
                        <div class="error-banner">{err}</div>
                    }
                })
            }}

            <div class="chat-header">
                <span class="chat-title">"Research Assistant"</span>
                <button class="lock-btn" on:click=move |_| state.lock()>
                    "Lock Session"
                </button>
            </div>

            <div class="messages-container">
                {move || {
                    if state.turns.get().is_empty() && !state.loading.get() {
                        view! {
                            <div class="empty-state">
                                <h3>"Begin Your Research"</h3>
                                <p>
                                    "Ask about specific country policies, UN resolutions, or upload source PDFs/images."
                                </p>
                            </div>
                        }.into_any()
                    } else {
                        view! {
                            <For
                                each=move || state.turns.get()
                                key=|t| t.id.clone()
                                let:turn
                            >
                                <TurnBubble turn=turn />
                            </For>
                            {move || {
                                state.loading.get().then(|| view! {
                                    <div class="message assistant">
                                        <div class="typing-indicator">"…"</div>
                                    </div>
                                })
                            }}
                        }.into_any()
                    }
                }}
            </div>

            <ChatInput />
        </main>
    }
}

/// A single chat bubble with its attachment chip and grounding links.
#[component]
fn TurnBubble(turn: Turn) -> impl IntoView {
    let css_class = match (turn.is_user(), turn.failure.is_some()) {
        (true, _) => "message user",
        (false, true) => "message assistant failed",
        (false, false) => "message assistant",
    };
    let attachment = turn.attachment.clone();
    let citations = turn.citations.clone();

    view! {
        <div class=css_class>
            {attachment.map(|file| view! { <div class="attachment-chip">{file.display_name}</div> })}
            <div class="message-body">{turn.content}</div>
            {(!citations.is_empty()).then(|| view! { <CitationList citations=citations /> })}
        </div>
    }
}

#[component]
fn CitationList(citations: Vec<Citation>) -> impl IntoView {
    view! {
        <div class="citations">
            <p class="citations-title">"Intelligence Grounding:"</p>
            <div class="citation-links">
                {citations
                    .into_iter()
                    .map(|c| {
                        let label = c.label();
                        let title = label.clone();
                        view! {
                            <a
                                href=c.uri.clone()
                                target="_blank"
                                rel="noopener noreferrer"
                                title=title
                            >
                                {label}
                            </a>
                        }
                    })
                    .collect_view()}
            </div>
        </div>
    }
}

/// Input bar: file picker, pending attachment chip, query box and send button.
#[component]
fn ChatInput() -> impl IntoView {
    let state = expect_context::<PortalState>();
    let (input, set_input) = signal(String::new());
    let file_input: NodeRef<html::Input> = NodeRef::new();

    let busy = move || state.loading.get() || state.uploading.get();

    let send = move || {
        let text = input.get_untracked();
        if !state.can_send(&text) {
            return;
        }
        set_input.set(String::new());
        state.send(text);
    };

    let on_submit = move |ev: ev::SubmitEvent| {
        ev.prevent_default();
        send();
    };

    let on_file_change = move |ev: ev::Event| {
        let picker: HtmlInputElement = event_target(&ev);
        if let Some(file) = picker.files().and_then(|files| files.get(0)) {
            state.attach(file);
        }
        // Allow re-selecting the same file later.
        picker.set_value("");
    };

    view! {
        <div class="input-area">
            {move || {
                state.pending_attachment.get().map(|file| {
                    view! {
                        <div class="pending-attachment">
                            {file.display_name}
                            <button class="remove-attachment" on:click=move |_| state.clear_attachment()>
                                "×"
                            </button>
                        </div>
                    }
                })
            }}
            <form class="input-row" on:submit=on_submit>
                <button
                    type="button"
                    class="attach-btn"
                    disabled=busy
                    on:click=move |_| {
                        if let Some(el) = file_input.get() {
                            el.click();
                        }
                    }
                >
                    "+"
                </button>
                <input
                    type="file"
                    class="hidden"
                    accept="application/pdf,image/*"
                    node_ref=file_input
                    on:change=on_file_change
                />
                <input
                    type="text"
                    placeholder="Ask about specific country policies or analyze a document..."
                    prop:value=input
                    on:input=move |ev| set_input.set(event_target_value(&ev))
                    disabled=busy
                />
                <button
                    type="submit"
                    class="send-btn"
                    disabled=move || !state.can_send(&input.get())
                >
                    {move || if state.loading.get() { "Researching…" } else { "Send" }}
                </button>
            </form>
            <p class="disclaimer">"AI can make mistakes. Verify critical facts with listed sources."</p>
        </div>
    }
}
