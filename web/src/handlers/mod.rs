//! HTTP request handlers, grouped by consumer.

pub mod display;
pub mod health;
pub mod operator;
pub mod singer;
pub mod websocket;

pub use display::display_router;
pub use health::{health_check, readiness};
pub use operator::operator_router;
pub use singer::singer_router;
