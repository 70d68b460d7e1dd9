use crate::game::SessionId;
use crate::intent::Intent;
use crate::player::{AccountId, PlayerHandle};
use crate::session_manager::{SessionManager, SessionSnapshot};
use crate::transport::{Mailbox, MailboxMessage};
use axum::{
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub manager: SessionManager,
    pub mailbox: Arc<Mailbox>,
}

/// An inbound intent on behalf of a chat account.
#[derive(Debug, Serialize, Deserialize)]
pub struct IntentRequest {
    #[serde(default)]
    pub name: String,
    pub intent: Intent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/players/{account_id}/intents", post(post_intent))
        .route("/players/{account_id}/messages", get(get_messages))
        .route("/sessions/{session_id}", get(get_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "Tic-tac-toe Lobby",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "post_intent": "POST /players/{account_id}/intents",
            "get_messages": "GET /players/{account_id}/messages",
            "get_session": "GET /sessions/{session_id}"
        }
    }))
}

/// Routes the intent and answers with the player's chat as it stands
/// afterwards.
async fn post_intent(
    AxumState(state): AxumState<AppState>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<IntentRequest>,
) -> Json<Vec<MailboxMessage>> {
    state
        .manager
        .handle(PlayerHandle::new(account_id, request.name), request.intent)
        .await;
    Json(state.mailbox.messages_for(account_id))
}

async fn get_messages(AxumState(state): AxumState<AppState>, Path(account_id): Path<AccountId>) -> Json<Vec<MailboxMessage>> {
    Json(state.mailbox.messages_for(account_id))
}

async fn get_session(
    AxumState(state): AxumState<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    state.manager.snapshot(session_id).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("session {} not found", session_id),
            }),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::game::{Mark, SessionState};
    use crate::identity::MemoryIdentityStore;
    use axum_test::TestServer;
    use serde_json::json;

    fn server() -> (TestServer, SessionManager) {
        let mailbox = Arc::new(Mailbox::new());
        let manager = SessionManager::new(EngineConfig::default(), mailbox.clone(), Arc::new(MemoryIdentityStore::new()));
        let app = router(AppState { manager: manager.clone(), mailbox });
        (TestServer::new(app).unwrap(), manager)
    }

    #[tokio::test]
    async fn test_root_lists_endpoints() {
        let (server, _) = server();
        let response = server.get("/").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["name"], "Tic-tac-toe Lobby");
    }

    #[tokio::test]
    async fn test_join_returns_updated_chat() {
        let (server, manager) = server();
        let response = server
            .post("/players/5/intents")
            .json(&json!({ "name": "Eve", "intent": { "type": "join_waiting" } }))
            .await;
        response.assert_status_ok();
        let messages: Vec<MailboxMessage> = response.json();
        assert_eq!(messages.last().unwrap().text, "You joined the waiting room.");
        assert!(manager.is_waiting(5));

        let polled: Vec<MailboxMessage> = server.get("/players/5/messages").await.json();
        assert_eq!(polled, messages);
    }

    #[tokio::test]
    async fn test_malformed_intent_rejected() {
        let (server, _) = server();
        let response = server
            .post("/players/5/intents")
            .json(&json!({ "intent": { "type": "fly" } }))
            .expect_failure()
            .await;
        assert!(response.status_code().is_client_error());
    }

    #[tokio::test]
    async fn test_session_snapshot_over_http() {
        let (server, manager) = server();
        let post = |id: u64, intent: serde_json::Value| {
            server
                .post(&format!("/players/{}/intents", id))
                .json(&json!({ "name": format!("p{}", id), "intent": intent }))
        };
        post(2, json!({ "type": "join_waiting" })).await;
        post(1, json!({ "type": "issue_challenge", "target": 2 })).await;
        post(2, json!({ "type": "confirm_challenge" })).await;
        post(1, json!({ "type": "choose_symbol", "mark": "mark2" })).await;

        let session_id = manager.session_of(1).unwrap();
        let snap: SessionSnapshot = server.get(&format!("/sessions/{}", session_id)).await.json();
        assert_eq!(snap.state, SessionState::InProgress);
        assert_eq!(snap.marks, [Some(Mark::Mark2), Some(Mark::Mark1)]);
        assert_eq!(snap.turn, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let (server, _) = server();
        let response = server
            .get(&format!("/sessions/{}", uuid::Uuid::new_v4()))
            .expect_failure()
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
