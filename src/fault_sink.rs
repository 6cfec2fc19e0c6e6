//! `FaultSink` decouples the alert ingestor (C5) from the command
//! dispatcher (C8): C5 depends on this trait, not on the concrete
//! dispatcher, breaking the natural construction-order cycle between them
//! (redesign item 2).

use async_trait::async_trait;

#[async_trait]
pub trait FaultSink: Send + Sync {
    /// Best-effort emission of an unsolicited fault report (F107). Callers
    /// must not block on this; implementations should not let a send
    /// failure propagate.
    async fn report_fault(&self, description: &str, problem_code: u16);
}
