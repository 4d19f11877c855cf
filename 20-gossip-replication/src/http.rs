//! Control surface: read, write and receive gossip over HTTP.
//!
//! | Route          | Body               | Response           |
//! |----------------|--------------------|--------------------|
//! | `GET /get`     | -                  | `Snapshot`         |
//! | `POST /set`    | `SetRequest`       | `Snapshot`         |
//! | `POST /notify` | `Notification`     | `NotifyResponse`   |
//! | `GET /members` | -                  | list of addresses  |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    membership::MembershipView,
    message::{Notification, NotifyResponse, SetRequest, Snapshot},
    reconcile::ReconciliationEngine,
};

pub struct AppState<M> {
    pub engine: Arc<ReconciliationEngine>,
    pub membership: Arc<M>,
}

impl<M> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            membership: Arc::clone(&self.membership),
        }
    }
}

pub fn router<M: MembershipView>(state: AppState<M>) -> Router {
    Router::new()
        .route("/get", get(get_value::<M>))
        .route("/set", post(set_value::<M>))
        .route("/notify", post(notify::<M>))
        .route("/members", get(members::<M>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_value<M: MembershipView>(State(state): State<AppState<M>>) -> Json<Snapshot> {
    Json(state.engine.value().get())
}

async fn set_value<M: MembershipView>(
    State(state): State<AppState<M>>,
    Json(request): Json<SetRequest>,
) -> Json<Snapshot> {
    let snapshot = state.engine.value().set(request.value);
    info!(
        value = snapshot.value,
        generation = snapshot.generation,
        "local write"
    );
    Json(snapshot)
}

async fn notify<M: MembershipView>(
    State(state): State<AppState<M>>,
    Json(notification): Json<Notification>,
) -> Json<NotifyResponse> {
    state.membership.observe(&notification.origin);
    let changed = state.engine.apply(&notification);
    Json(NotifyResponse { changed })
}

async fn members<M: MembershipView>(State(state): State<AppState<M>>) -> Json<Vec<String>> {
    Json(state.membership.members())
}
