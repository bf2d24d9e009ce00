//! Data model for vendor operations.
//!
//! - [`Credentials`]: per-tenant connection settings, never logged verbatim
//! - [`CallOptions`]: per-call behavior switches (cache, idempotency,
//!   throttle, breaker bypass)
//! - [`WireParams`] / [`WireValue`]: schema-validated wire payload
//! - [`VendorResponse`]: result of a successful operation

mod credentials;
mod request;
mod response;

pub use credentials::{Credentials, DEFAULT_TENANT};
pub use request::{CallOptions, WireParams, WireValue};
pub use response::VendorResponse;
