mod api;
mod components;
mod models;
mod state;
mod ws;

use leptos::mount::mount_to_body;
use leptos::prelude::*;

use components::chat::ResearchChat;
use components::gate::AccessGate;
use state::PortalState;

/// Root application component.
#[component]
fn App() -> impl IntoView {
    let state = PortalState::provide();

    // Open a locked session on mount
    state.start_session();

    view! {
        <div class="app-container">
            <Show when=move || state.unlocked.get() fallback=|| view! { <AccessGate /> }>
                <ResearchChat />
            </Show>
        </div>
    }
}

fn main() {
    console_log::init_with_level(log::Level::Debug).expect("Failed to init logger");
    mount_to_body(App);
}
