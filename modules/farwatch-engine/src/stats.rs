//! Campaign counters. Shared across PIR tasks, so everything is atomic.

use std::sync::atomic::{AtomicU32, Ordering};

/// Counters accumulated over one campaign run.
#[derive(Debug, Default)]
pub struct CampaignStats {
    pub documents_collected: AtomicU32,
    pub evaluations_issued: AtomicU32,
    pub signals_created: AtomicU32,
    pub discovery_errors: AtomicU32,
    pub fetch_errors: AtomicU32,
    pub evaluation_errors: AtomicU32,
    pub persistence_errors: AtomicU32,
}

impl CampaignStats {
    pub fn add_documents(&self, n: u32) {
        self.documents_collected.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_evaluation(&self) {
        self.evaluations_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signal(&self) {
        self.signals_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discovery_error(&self) {
        self.discovery_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evaluation_error(&self) {
        self.evaluation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_error(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn documents(&self) -> u32 {
        self.documents_collected.load(Ordering::Relaxed)
    }

    pub fn evaluations(&self) -> u32 {
        self.evaluations_issued.load(Ordering::Relaxed)
    }

    pub fn signals(&self) -> u32 {
        self.signals_created.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for CampaignStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Campaign Complete ===")?;
        writeln!(f, "Documents collected: {}", self.documents())?;
        writeln!(f, "Evaluations issued:  {}", self.evaluations())?;
        writeln!(f, "Signals created:     {}", self.signals())?;
        writeln!(f, "\nErrors:")?;
        writeln!(
            f,
            "  discovery:   {}",
            self.discovery_errors.load(Ordering::Relaxed)
        )?;
        writeln!(
            f,
            "  fetch:       {}",
            self.fetch_errors.load(Ordering::Relaxed)
        )?;
        writeln!(
            f,
            "  evaluation:  {}",
            self.evaluation_errors.load(Ordering::Relaxed)
        )?;
        writeln!(
            f,
            "  persistence: {}",
            self.persistence_errors.load(Ordering::Relaxed)
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = CampaignStats::default();
        stats.add_documents(10);
        stats.add_documents(5);
        stats.record_signal();
        stats.record_evaluation();
        stats.record_evaluation_error();
        assert_eq!(stats.documents(), 15);
        assert_eq!(stats.signals(), 1);
        assert_eq!(stats.evaluations(), 1);
        assert_eq!(stats.evaluation_errors.load(Ordering::Relaxed), 1);
    }
}
