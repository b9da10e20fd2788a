// # prom-mdns-core
//
// Core library for mDNS-based Prometheus service discovery.
//
// ## Architecture Overview
//
// This library provides the discovery scheduling and aggregation engine:
// - **ServiceBrowser**: Trait for querying the discovery protocol
// - **LookupAdapter**: Turns browser responses into target groups
// - **DiscoveryEngine**: Periodic refresh cycles with concurrent lookups
// - **DedupSink**: Canonicalizes, fingerprints and commits aggregates
// - **OutputWriter**: Trait for publishing committed output (console, file)
//
// ## Design Principles
//
// 1. **Separation of Concerns**: The wire protocol lives behind `ServiceBrowser`
// 2. **Structured Concurrency**: Every lookup of a cycle is joined before the
//    aggregate is delivered
// 3. **Cooperative Cancellation**: One `CancellationToken` reaches the
//    scheduler and every in-flight lookup
// 4. **Library-First**: The daemon is a thin layer over this crate
// 5. **Idempotency**: Unchanged output is never rewritten

pub mod config;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod output;
pub mod sink;
pub mod target;
pub mod traits;

// Re-export core types for convenience
pub use config::{DiscoveryConfig, EngineConfig, OutputConfig};
pub use engine::{DiscoveryEngine, EngineEvent, SchedulerState};
pub use error::{Error, Result};
pub use lookup::LookupAdapter;
pub use output::{ConsoleOutput, FileOutput, MemoryOutput};
pub use sink::{CommitOutcome, DedupSink, SinkStats};
pub use target::{LabeledGroup, OutputFormat, TargetGroup};
pub use traits::{OutputWriter, ServiceBrowser, ServiceEntry};
pub use tokio_util::sync::CancellationToken;
