//! Location broadcast payload types.

use serde::{Deserialize, Serialize};

/// Client reports its current coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLocation {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// Server fan-out of one user's coordinates to every connected session.
///
/// Emitted for each inbound `UpdateLocation`, including back to the sender.
/// Delivery is best-effort and unordered across receivers; repeated
/// identical coordinates are still rebroadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// User the coordinates belong to.
    pub user_id: u64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Whether this user has an unread in-room message waiting.
    pub has_recent_message: bool,
}
