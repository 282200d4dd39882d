//! Public client surface: configuration and the delivery handle.

pub mod client;
pub mod config;

pub use client::{ClientError, Delivery, DeliveryClient};
pub use config::{SyslogConfig, SyslogConfigBuilder};
