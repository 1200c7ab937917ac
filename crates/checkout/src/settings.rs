use chrono::Duration;

/// Lifetimes used by the reservation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationSettings {
    /// How long a reservation holds stock before the sweeper returns it.
    pub reservation_ttl: Duration,
    /// How long a reserve result stays cached. Matches the reservation
    /// lifetime by default.
    pub reserve_idempotency_ttl: Duration,
    /// How long a release result stays cached.
    pub release_idempotency_ttl: Duration,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::hours(24),
            reserve_idempotency_ttl: Duration::hours(24),
            release_idempotency_ttl: Duration::days(7),
        }
    }
}
