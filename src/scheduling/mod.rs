//! Appointment scheduling and same-day queue management.
//!
//! [`service::SchedulingService`] is the only entry point the HTTP layer
//! uses. It validates callers and inputs, then delegates to the catalog,
//! the slot grid, the appointment store and the queue projector.

pub mod catalog;
pub mod clock;
pub mod events;
pub mod memory_store;
pub mod pg_store;
pub mod queue;
pub mod service;
pub mod slots;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
