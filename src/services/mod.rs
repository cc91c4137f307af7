/// Booking construction and reads.
pub mod booking_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Background expiry of overdue lobbies.
pub mod expiry;
/// Health check service.
pub mod health_service;
/// Lobby lifecycle coordination.
pub mod lobby_service;
/// Storage connection supervision.
pub mod storage_supervisor;
