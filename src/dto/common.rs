use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::PriceEntity,
    dto::format_system_time,
    state::lobby::TimeWindow,
};

/// Booking window as exposed to clients, RFC 3339 formatted.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct TimeWindowView {
    /// Start of the reserved slot.
    pub starts_at: String,
    /// End of the reserved slot.
    pub ends_at: String,
}

impl From<TimeWindow> for TimeWindowView {
    fn from(window: TimeWindow) -> Self {
        Self {
            starts_at: format_system_time(window.starts_at),
            ends_at: format_system_time(window.ends_at),
        }
    }
}

/// Price as exposed to clients.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PriceView {
    /// Amount in the currency's minor unit (cents).
    pub amount_minor: i64,
    /// ISO 4217 currency code.
    pub currency: String,
}

impl From<PriceEntity> for PriceView {
    fn from(price: PriceEntity) -> Self {
        Self {
            amount_minor: price.amount_minor,
            currency: price.currency,
        }
    }
}
