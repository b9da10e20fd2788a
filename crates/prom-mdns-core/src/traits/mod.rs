//! Core traits for the discovery engine
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ServiceBrowser`]: Query the discovery protocol for a service name
//! - [`OutputWriter`]: Publish committed target lists

pub mod output_writer;
pub mod service_browser;

pub use output_writer::OutputWriter;
pub use service_browser::{ServiceBrowser, ServiceEntry};
