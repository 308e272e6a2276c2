pub mod badge;
pub mod lap_count;
pub mod position_change;

pub use badge::{Badge, BadgeCell};
pub use lap_count::{SESSION_THROTTLE, SessionLapCount, SessionLapCountView, session_lap_count};
pub use position_change::{PositionChange, PositionChangeCell, Trend};
