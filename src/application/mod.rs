//! Application layer containing the settlement orchestration.
//!
//! This module defines the `SettlementCoordinator`, the entry point route
//! handlers and the CLI call to quote, book, collect payment and move
//! bookings through their lifecycle.

pub mod settlement;
