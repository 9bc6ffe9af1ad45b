use super::job_alloc::JobAlloc;
use super::job_entry::{Job, JobConf, JobKind, JobState};
use super::job_notify::JobNotifier;
use super::job_table::JobTable;
use super::job_transaction::JobTransaction;
use super::JobErrno;
use crate::manager::data::JobMode;
use crate::manager::unit::unit_datastore::UnitDb;
use crate::manager::unit::unit_entry::UnitX;
use std::rc::Rc;

/// the jobs a transaction touched, in install order
pub struct JobAffect {
    ///
    pub adds: Vec<Rc<Job>>,
}

impl Default for JobAffect {
    fn default() -> Self {
        JobAffect::new()
    }
}

impl JobAffect {
    pub fn new() -> JobAffect {
        JobAffect { adds: Vec::new() }
    }

    pub(super) fn record(&mut self, job: &Rc<Job>) {
        self.adds.push(Rc::clone(job));
    }
}

/// Owns the live job table and drives transactions against it.
pub struct JobManager {
    // associated objects
    db: Rc<UnitDb>,
    notifier: Rc<dyn JobNotifier>,

    // owned objects
    ja: JobAlloc,
    jobs: JobTable,
}

impl JobManager {
    pub fn new(dbr: &Rc<UnitDb>, notifier: Rc<dyn JobNotifier>) -> JobManager {
        JobManager {
            db: Rc::clone(dbr),
            notifier,
            ja: JobAlloc::new(),
            jobs: JobTable::new(),
        }
    }

    /// Build a transaction for `config`, reduce it and commit it.
    ///
    /// A failing transaction is aborted here; the live table is untouched by
    /// anything but a successful apply.
    pub fn exec(
        &self,
        config: &JobConf,
        mode: JobMode,
        affect: &mut JobAffect,
    ) -> Result<(), JobErrno> {
        let mut tr = JobTransaction::new(false);

        let ret = self.exec_one(&mut tr, config, mode, affect);
        if ret.is_err() {
            tr.abort();
        }
        ret
    }

    /// stop `unit` together with everything it triggers
    pub fn trigger_unit(&self, unit: &Rc<UnitX>, affect: &mut JobAffect) -> Result<(), JobErrno> {
        let config = JobConf::new(unit, JobKind::JobStop);
        self.exec(&config, JobMode::JobTrigger, affect)
    }

    /// the job currently installed for `unit`
    pub fn get_job(&self, unit: &UnitX) -> Option<Rc<Job>> {
        self.jobs.get(unit)
    }

    ///
    pub fn has_job(&self, unit: &UnitX) -> bool {
        self.jobs.get(unit).is_some()
    }

    ///
    pub fn n_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// the live table, for callers that plan transactions by hand
    pub fn table(&self) -> &JobTable {
        &self.jobs
    }

    ///
    pub fn alloc(&self) -> &JobAlloc {
        &self.ja
    }

    /// record the executor's verdict on an installed job
    pub fn finish_job(&self, job: &Rc<Job>, state: JobState) {
        self.jobs.finish_job(job, state, &*self.notifier);
    }

    fn exec_one(
        &self,
        tr: &mut JobTransaction,
        config: &JobConf,
        mode: JobMode,
        affect: &mut JobAffect,
    ) -> Result<(), JobErrno> {
        tr.add_job_and_dependencies(
            &self.db,
            config,
            None,
            true,
            false,
            mode.is_expand_ignored(),
            false,
        )?;

        match mode {
            JobMode::JobIsolate => tr.add_isolate_jobs(&self.db)?,
            JobMode::JobTrigger => tr.add_triggering_jobs(&self.db, config.get_unit())?,
            _ => {}
        }

        tr.activate(
            &self.db,
            &self.jobs,
            &self.ja,
            mode,
            &*self.notifier,
            Some(affect),
        )
    }
}
