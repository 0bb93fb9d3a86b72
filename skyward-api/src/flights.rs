use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use skyward_core::flight::Seat;
use skyward_shared::{SeatEvent, SeatEventKind};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/{id}/seats", get(available_seats))
        .route("/v1/flights/{id}/seats/stream", get(seat_stream))
}

async fn available_seats(
    State(state): State<AppState>,
    Path(flight_id): Path<Uuid>,
) -> Result<Json<Vec<Seat>>, AppError> {
    Ok(Json(state.seats.available_seats(flight_id).await?))
}

/// Live seat map changes for one flight
async fn seat_stream(
    State(state): State<AppState>,
    Path(flight_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("Seat stream opened for flight {}", flight_id);

    let stream = BroadcastStream::new(state.sse_tx.subscribe()).filter_map(move |msg| async move {
        match msg {
            Ok(event) if event.flight_id == flight_id => to_sse_event(&event).map(Ok),
            // Lagged receivers skip what they missed
            _ => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &SeatEvent) -> Option<Event> {
    let name = match event.kind {
        SeatEventKind::Assigned => "seat_assigned",
        SeatEventKind::Released => "seat_released",
    };
    Event::default().event(name).json_data(event).ok()
}
