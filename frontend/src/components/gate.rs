use leptos::ev;
use leptos::prelude::*;

use crate::state::PortalState;

/// Access-key form shown while the session is locked.
#[component]
pub fn AccessGate() -> impl IntoView {
    let state = expect_context::<PortalState>();
    let (access_key, set_access_key) = signal(String::new());

    let on_submit = move |ev: ev::SubmitEvent| {
        ev.prevent_default();
        state.unlock(access_key.get_untracked());
    };

    view! {
        <div class="gate">
            <h2>"Research Portal"</h2>
            <p class="gate-hint">"One-time purchase required. Enter your access code below."</p>
            <form on:submit=on_submit>
                <label for="access-key">"Access Key"</label>
                <input
                    id="access-key"
                    type="password"
                    placeholder="••••••••"
                    prop:value=access_key
                    on:input=move |ev| set_access_key.set(event_target_value(&ev))
                />
                {move || state.gate_error.get().map(|err| view! { <p class="gate-error">{err}</p> })}
                <button type="submit" disabled=move || state.session_id.get().is_none()>
                    "Unlock Terminal"
                </button>
            </form>
        </div>
    }
}
