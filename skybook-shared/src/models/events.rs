use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatHeldEvent {
    pub flight_id: Uuid,
    pub seat_number: String,
    pub booking_id: Uuid,
    pub owner_id: String,
    pub held_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub seat_number: String,
    pub owner_id: String,
    pub payment_attempt_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatReleasedEvent {
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub seat_number: String,
    pub owner_id: String,
    /// "TIMEOUT" or "CANCELLED"
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct RefundRequestedEvent {
    pub booking_id: Uuid,
    pub payment_attempt_id: Uuid,
    pub idempotency_key: String,
    pub amount_cents: i64,
    pub currency: String,
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct PaymentUnresolvedEvent {
    pub booking_id: Uuid,
    pub payment_attempt_id: Uuid,
    pub idempotency_key: String,
    pub unresolved_for_seconds: i64,
    pub timestamp: i64,
}

/// Everything the saga announces to the outside world. Serialized with an
/// `event` tag so consumers can route on it.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookingEvent {
    SeatHeld(SeatHeldEvent),
    BookingConfirmed(BookingConfirmedEvent),
    SeatReleased(SeatReleasedEvent),
    RefundRequested(RefundRequestedEvent),
    PaymentUnresolved(PaymentUnresolvedEvent),
}

impl BookingEvent {
    /// Topic-style name, used as the message key and SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::SeatHeld(_) => "seat_held",
            BookingEvent::BookingConfirmed(_) => "booking_confirmed",
            BookingEvent::SeatReleased(_) => "seat_released",
            BookingEvent::RefundRequested(_) => "refund_requested",
            BookingEvent::PaymentUnresolved(_) => "payment_unresolved",
        }
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            BookingEvent::SeatHeld(e) => e.booking_id,
            BookingEvent::BookingConfirmed(e) => e.booking_id,
            BookingEvent::SeatReleased(e) => e.booking_id,
            BookingEvent::RefundRequested(e) => e.booking_id,
            BookingEvent::PaymentUnresolved(e) => e.booking_id,
        }
    }

    /// Flight the event concerns, when it changes seat availability.
    pub fn flight_id(&self) -> Option<Uuid> {
        match self {
            BookingEvent::SeatHeld(e) => Some(e.flight_id),
            BookingEvent::BookingConfirmed(e) => Some(e.flight_id),
            BookingEvent::SeatReleased(e) => Some(e.flight_id),
            BookingEvent::RefundRequested(_) | BookingEvent::PaymentUnresolved(_) => None,
        }
    }
}
