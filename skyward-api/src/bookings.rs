use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use skyward_booking::CreateBooking;
use skyward_core::booking::{Booking, Leg, Passenger, PassengerDetails};
use skyward_core::flight::Seat;
use skyward_core::payment::{Payment, PaymentMethod};
use tracing::info;

use crate::{error::AppError, middleware::auth::CustomerClaims, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    #[serde(flatten)]
    pub booking: CreateBooking,
    /// Optional passenger data, parked until the passenger step
    #[serde(default)]
    pub passenger_details: Vec<PassengerDetails>,
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub grand_total: Decimal,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        let grand_total = booking.grand_total();
        Self { booking, grand_total }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedBooking {
    #[serde(flatten)]
    pub booking: BookingView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: BookingView,
    pub passengers: Vec<Passenger>,
    pub payment: Option<Payment>,
}

/// Either fresh passenger data or the token handed out at creation
#[derive(Debug, Deserialize)]
pub struct AddPassengersRequest {
    #[serde(default)]
    pub draft_token: Option<String>,
    #[serde(default)]
    pub passengers: Option<Vec<PassengerDetails>>,
}

#[derive(Debug, Deserialize)]
pub struct SeatSelection {
    pub passenger_index: usize,
    pub seat_number: String,
    #[serde(default)]
    pub leg: Leg,
}

#[derive(Debug, Deserialize)]
pub struct SeatSelectionRequest {
    pub selections: Vec<SeatSelection>,
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub booking: BookingView,
    pub payment: Payment,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{reference}", get(get_booking))
        .route("/v1/bookings/{reference}/passengers", post(add_passengers))
        .route("/v1/bookings/{reference}/seats", post(select_seats))
        .route("/v1/bookings/{reference}/pay", post(pay))
        .route("/v1/bookings/{reference}/cancel", post(cancel))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    let mut create = req.booking;
    create.user_id = claims.user_id()?;
    if create.contact_email.trim().is_empty() {
        create.contact_email = claims.email.clone();
    }

    let booking = state.ledger.create(create).await?;

    let draft_token = if req.passenger_details.is_empty() {
        None
    } else {
        Some(state.drafts.stash(&booking.reference, &req.passenger_details).await?)
    };

    Ok((
        StatusCode::CREATED,
        Json(CreatedBooking {
            booking: booking.into(),
            draft_token,
        }),
    ))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    let bookings = state.ledger.list_for_user(claims.user_id()?).await?;
    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(reference): Path<String>,
) -> Result<Json<BookingDetail>, AppError> {
    let booking = state.ledger.find(&reference, claims.user_id()?).await?;
    let passengers = state.ledger.passengers(&booking).await?;
    let payment = state.ledger.payment(&booking).await?;

    Ok(Json(BookingDetail {
        booking: booking.into(),
        passengers,
        payment,
    }))
}

async fn add_passengers(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(reference): Path<String>,
    Json(req): Json<AddPassengersRequest>,
) -> Result<(StatusCode, Json<Vec<Passenger>>), AppError> {
    let booking = state.ledger.find(&reference, claims.user_id()?).await?;

    let details = match (req.passengers, req.draft_token.as_deref()) {
        (Some(passengers), _) => passengers,
        (None, Some(token)) => state.drafts.load(token, &booking.reference).await?,
        (None, None) => {
            return Err(AppError::ValidationError(
                "Passenger details or a draft token are required".to_string(),
            ))
        }
    };

    let passengers = state.ledger.add_passengers(&booking, details).await?;

    if let Some(token) = req.draft_token.as_deref() {
        state.drafts.discard(token).await?;
    }

    Ok((StatusCode::CREATED, Json(passengers)))
}

/// Selections are applied in order; a refused seat stops the batch.
async fn select_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(reference): Path<String>,
    Json(req): Json<SeatSelectionRequest>,
) -> Result<Json<Vec<Seat>>, AppError> {
    if req.selections.is_empty() {
        return Err(AppError::ValidationError("No seats selected".to_string()));
    }

    let booking = state.ledger.find(&reference, claims.user_id()?).await?;

    let mut assigned = Vec::with_capacity(req.selections.len());
    for selection in &req.selections {
        let seat = state
            .seats
            .assign_leg(&booking, selection.passenger_index, selection.leg, &selection.seat_number)
            .await?;
        assigned.push(seat);
    }

    info!("{} seats selected on booking {}", assigned.len(), booking.reference);
    Ok(Json(assigned))
}

async fn pay(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(reference): Path<String>,
    Json(req): Json<PayRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    let booking = state.ledger.find(&reference, claims.user_id()?).await?;
    let (confirmed, payment) = state.payments.record(&booking, req.payment_method).await?;

    Ok(Json(PaymentResponse {
        booking: confirmed.into(),
        payment,
    }))
}

async fn cancel(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(reference): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    let booking = state.ledger.find(&reference, claims.user_id()?).await?;
    let cancelled = state.ledger.cancel(&booking).await?;
    Ok(Json(cancelled.into()))
}
