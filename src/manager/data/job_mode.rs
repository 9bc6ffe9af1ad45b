/// how a transaction interacts with jobs already installed in the live table
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum JobMode {
    /// replace conflicting installed jobs, unless they are irreversible
    JobReplace,
    /// fail if any installed job conflicts with the new transaction
    JobFail,
    /// stop every unit not part of the new transaction, then as replace
    JobIsolate,
    /// cancel every installed job not part of the new transaction
    JobFlush,
    /// build the anchor job only, no dependency recursion
    JobIgnoreDependencies,
    /// recurse, but skip requirement pull-ins
    JobIgnoreRequirements,
    /// as replace, and mark every job of the transaction irreversible
    JobReplaceIrreversibly,
    /// as replace; selects the triggered-stop affect step
    JobTrigger,
}

impl Default for JobMode {
    fn default() -> JobMode {
        JobMode::JobReplace
    }
}

impl JobMode {
    /// requirement recursion is suppressed in these modes
    pub fn is_expand_ignored(&self) -> bool {
        matches!(
            self,
            JobMode::JobIgnoreDependencies | JobMode::JobIgnoreRequirements
        )
    }

    pub(crate) fn is_gc_skipped(&self) -> bool {
        *self == JobMode::JobIsolate
    }

    pub(crate) fn is_pre_cancel(&self) -> bool {
        matches!(self, JobMode::JobIsolate | JobMode::JobFlush)
    }
}
