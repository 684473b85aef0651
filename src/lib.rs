//! Buffered, batched log shipping to an ingestion service that orders writes
//! with a rotating sequence token.
//!
//! Producers call [`LogSink::submit`] from any thread; records are filtered,
//! formatted and put into a bounded buffer without blocking. A background task
//! drains the buffer on a fixed period and delivers each batch through a
//! [`DeliveryAdapter`], retrying with the server's expected token when the
//! current one has gone stale.

pub mod cli;
pub mod config;
pub mod delivery;
pub mod layer;
pub mod record;
pub mod shipper;

pub use config::Config;
pub use delivery::{DeliveryAdapter, DeliveryError, DestinationIdentity, HttpDelivery};
pub use layer::ShipperLayer;
pub use record::{EcsFormatter, Formatter, LogRecord, Severity};
pub use shipper::{LogEvent, LogShipper, LogSink, ShipperOptions, ShutdownReport};
