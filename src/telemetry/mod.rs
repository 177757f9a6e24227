//! Per-node radio telemetry: quality scoring and the last-seen registry.

pub mod quality;
pub mod registry;

pub use quality::{score, QualityTier, SignalReport};
pub use registry::{HopGroup, NetSnapshot, NodeRegistry, NodeTelemetry, NET_WINDOW_HOURS};
