//! Reconciliation job reports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The three repair procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairJob {
    BalanceRepair,
    OrphanRepair,
    InvestorCleanup,
}

impl RepairJob {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairJob::BalanceRepair => "balance-repair",
            RepairJob::OrphanRepair => "orphan-repair",
            RepairJob::InvestorCleanup => "investor-cleanup",
        }
    }
}

impl fmt::Display for RepairJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepairJob {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balance-repair" => Ok(RepairJob::BalanceRepair),
            "orphan-repair" => Ok(RepairJob::OrphanRepair),
            "investor-cleanup" => Ok(RepairJob::InvestorCleanup),
            other => Err(format!("unknown job: {other}")),
        }
    }
}

/// Summary returned by every job.
///
/// `processed` counts records examined, `fixed` counts records changed and
/// `failures` counts records whose repair failed and was skipped. A second
/// run with no new events reports `fixed == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub job: RepairJob,
    pub processed: u64,
    pub fixed: u64,
    pub failures: u64,
}

impl RepairReport {
    pub fn new(job: RepairJob) -> Self {
        Self {
            job,
            processed: 0,
            fixed: 0,
            failures: 0,
        }
    }

    /// Add the counts of a sub-step or a single record.
    pub fn absorb(&mut self, processed: u64, fixed: u64) {
        self.processed += processed;
        self.fixed += fixed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_names_parse() {
        for job in [
            RepairJob::BalanceRepair,
            RepairJob::OrphanRepair,
            RepairJob::InvestorCleanup,
        ] {
            assert_eq!(job.to_string().parse::<RepairJob>(), Ok(job));
        }
    }

    #[test]
    fn absorb_accumulates() {
        let mut report = RepairReport::new(RepairJob::OrphanRepair);
        report.absorb(3, 1);
        report.absorb(2, 0);
        assert_eq!((report.processed, report.fixed, report.failures), (5, 1, 0));
    }
}
