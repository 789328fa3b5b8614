//! Domain layer: value objects, the booking state machine and the ports the
//! engine talks to. Nothing in here performs I/O.

pub mod booking;
pub mod cancellation;
pub mod identity;
pub mod money;
pub mod payment;
pub mod ports;
pub mod pricing;
pub mod vehicle;
pub mod window;
