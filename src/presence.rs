use crate::gateway::events::Event;
use crate::gateway::session::DeliveryReport;
use crate::state::AppState;

/// Tell the user's direct-chat companions that they came online or went offline.
pub async fn announce(state: &AppState, user_id: &str, is_online: bool) -> DeliveryReport {
    let audience = state.audience.presence(user_id).await;
    state.dispatcher.dispatch(
        &audience,
        &Event::NewStatus {
            user_id: user_id.to_string(),
            is_online,
        },
    )
}

pub fn is_online(state: &AppState, user_id: &str) -> bool {
    state.sessions.is_online(user_id)
}
