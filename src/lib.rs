//! Cluster-resource control plane.
//!
//! Ties together the world model (chassis/board/stack repositories), the
//! platform-API collector, the HTTP alert ingestor, the BMC presence
//! receiver, the multicast command dispatcher, and the HA arbiter. See
//! `DESIGN.md` for how each module maps onto the spec.

pub mod alert_server;
pub mod api_client;
pub mod bmc;
pub mod chassis_controller;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod fault_sink;
pub mod ha;
pub mod repository;
pub mod topology;
