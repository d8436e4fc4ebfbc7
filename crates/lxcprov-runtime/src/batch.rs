//! Sequential batch provisioning.

use std::collections::HashSet;

use lxcprov_common::types::{ContainerRecord, RecordSpec};

use crate::engine::{Outcome, ProvisionReport, ProvisioningEngine};

/// Feeds batch records through a [`ProvisioningEngine`] one at a time.
///
/// A failing record never stops the batch. Callers own the single-invoker
/// constraint: two runners must not work on the same LXC path at once.
pub struct BatchRunner {
    engine: ProvisioningEngine,
}

impl BatchRunner {
    /// Creates a runner around `engine`.
    #[must_use]
    pub const fn new(engine: ProvisioningEngine) -> Self {
        Self { engine }
    }

    /// Provisions every record in order and reports one outcome per record.
    ///
    /// Records failing validation are reported without touching the
    /// backend. A name seen earlier in the batch replaces that container.
    pub fn run(&self, specs: &[RecordSpec]) -> BatchReport {
        let mut seen = HashSet::new();
        let mut reports = Vec::with_capacity(specs.len());

        for (index, spec) in specs.iter().enumerate() {
            if !seen.insert(spec.name.as_str()) {
                tracing::warn!(
                    index,
                    name = %spec.name,
                    "name repeats an earlier record, that container will be replaced"
                );
            }
            tracing::info!(index, total = specs.len(), name = %spec.name, "provisioning record");
            reports.push(self.run_one(spec));
        }

        let report = BatchReport { reports };
        tracing::info!(
            succeeded = report.succeeded(),
            warned = report.warned(),
            failed = report.failed(),
            "batch finished"
        );
        report
    }

    fn run_one(&self, spec: &RecordSpec) -> ProvisionReport {
        match ContainerRecord::try_from(spec) {
            Ok(record) => self.engine.provision(&record),
            Err(cause) => {
                tracing::error!(name = %spec.name, error = %cause, "record rejected");
                ProvisionReport::rejected(&spec.name, cause)
            }
        }
    }
}

/// Ordered reports of one batch run, one per input record.
#[derive(Debug)]
pub struct BatchReport {
    /// Reports in input order.
    pub reports: Vec<ProvisionReport>,
}

impl BatchReport {
    /// Number of records fully provisioned.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Success))
    }

    /// Number of records running with package warnings.
    #[must_use]
    pub fn warned(&self) -> usize {
        self.count(|o| matches!(o, Outcome::SuccessWithPackageWarning { .. }))
    }

    /// Number of records that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(Outcome::is_failure)
    }

    /// Returns whether no record failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}
