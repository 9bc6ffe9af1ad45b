use super::job_entry::{self, Job, JobState};
use super::job_notify::JobNotifier;
use super::JobErrno;
use crate::manager::unit::unit_entry::UnitX;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The live job table: at most one installed job per unit, indexed by id.
///
/// Only the applier writes to it; everything else reads.
pub struct JobTable {
    t_unit: RefCell<HashMap<String, Rc<Job>>>,
    t_id: RefCell<HashMap<u32, Rc<Job>>>,
}

impl Default for JobTable {
    fn default() -> Self {
        JobTable::new()
    }
}

impl JobTable {
    pub fn new() -> JobTable {
        JobTable {
            t_unit: RefCell::new(HashMap::new()),
            t_id: RefCell::new(HashMap::new()),
        }
    }

    ///
    pub fn len(&self) -> usize {
        self.t_unit.borrow().len()
    }

    ///
    pub fn is_empty(&self) -> bool {
        self.t_unit.borrow().is_empty()
    }

    /// the job currently attached to `unit`, if any
    pub fn get(&self, unit: &UnitX) -> Option<Rc<Job>> {
        self.t_unit.borrow().get(unit.id()).cloned()
    }

    ///
    pub fn get_by_id(&self, id: u32) -> Option<Rc<Job>> {
        self.t_id.borrow().get(&id).cloned()
    }

    /// every installed job, in id order
    pub fn jobs(&self) -> Vec<Rc<Job>> {
        let mut jobs: Vec<Rc<Job>> = self.t_unit.borrow().values().map(Rc::clone).collect();
        jobs.sort_by_key(|job| job.id());
        jobs
    }

    /// make the job visible under its id; the unit slot follows at install
    pub(super) fn publish(&self, job: &Rc<Job>) -> Result<(), JobErrno> {
        let mut t_id = self.t_id.borrow_mut();
        if t_id.contains_key(&job.id()) {
            return Err(JobErrno::JobErrNoMemory);
        }
        t_id.insert(job.id(), Rc::clone(job));
        Ok(())
    }

    pub(super) fn remove_id(&self, id: u32) {
        self.t_id.borrow_mut().remove(&id);
    }

    /// Attach `job` to its unit. An existing conflicting job is canceled; a
    /// mergeable one absorbs the newcomer and survives. Returns the job that
    /// ends up installed.
    pub(super) fn install(&self, job: &Rc<Job>, notifier: &dyn JobNotifier) -> Rc<Job> {
        if let Some(uj) = self.get(job.unit()) {
            if job_entry::job_is_conflicting(uj.kind(), job.kind()) {
                log::debug!(
                    "canceling installed job {:?}, conflicts with incoming {:?}",
                    uj,
                    job
                );
                self.finish_job(&uj, JobState::JobCanceled, notifier);
            } else if uj.merge_into_installed(job.kind()) {
                uj.set_irreversible(uj.irreversible() || job.irreversible());
                uj.set_ignore_order(uj.ignore_order() || job.ignore_order());
                log::debug!("merged incoming job {:?} into installed {:?}", job, uj);
                return uj;
            } else {
                // unmergeable but not conflicting (a nop in the way)
                self.finish_job(&uj, JobState::JobCanceled, notifier);
            }
        }

        self.t_unit
            .borrow_mut()
            .insert(job.unit().id().clone(), Rc::clone(job));
        Rc::clone(job)
    }

    /// take the job out of the table and record why; never cascades
    pub(super) fn finish_job(&self, job: &Rc<Job>, state: JobState, notifier: &dyn JobNotifier) {
        let mut t_unit = self.t_unit.borrow_mut();
        if let Some(uj) = t_unit.get(job.unit().id()) {
            if Rc::ptr_eq(uj, job) {
                t_unit.remove(job.unit().id());
            }
        }
        drop(t_unit);
        self.t_id.borrow_mut().remove(&job.id());
        job.set_state(state);
        notifier.job_finished(job);
    }
}

#[cfg(test)]
mod tests {
    use super::super::job_entry::{Job, JobKind, JobState};
    use super::super::job_notify::NopNotifier;
    use super::JobTable;
    use crate::manager::data::UnitActiveState;
    use crate::manager::unit::unit_entry::{UnitType, UnitX};
    use std::rc::Rc;

    #[test]
    fn table_install_and_get() {
        let table = JobTable::new();
        let unit = UnitX::new(UnitType::UnitService, "test1.service");
        let job = Job::new(&unit, JobKind::JobStart);
        job.set_id(1);
        table.publish(&job).unwrap();

        let installed = table.install(&job, &NopNotifier);
        assert!(Rc::ptr_eq(&installed, &job));
        assert_eq!(table.len(), 1);
        assert!(table.get(&unit).is_some());
        assert!(table.get_by_id(1).is_some());
    }

    #[test]
    fn table_install_merges_compatible_job() {
        let table = JobTable::new();
        let unit = UnitX::new(UnitType::UnitService, "test1.service");
        unit.set_active_state(UnitActiveState::UnitInActive);

        let first = Job::new(&unit, JobKind::JobStart);
        first.set_id(1);
        table.publish(&first).unwrap();
        table.install(&first, &NopNotifier);

        let second = Job::new(&unit, JobKind::JobVerify);
        second.set_id(2);
        table.publish(&second).unwrap();
        let installed = table.install(&second, &NopNotifier);

        assert!(Rc::ptr_eq(&installed, &first));
        assert_eq!(installed.kind(), JobKind::JobStart);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn table_install_cancels_conflicting_job() {
        let table = JobTable::new();
        let unit = UnitX::new(UnitType::UnitService, "test1.service");

        let start = Job::new(&unit, JobKind::JobStart);
        start.set_id(1);
        table.publish(&start).unwrap();
        table.install(&start, &NopNotifier);

        let stop = Job::new(&unit, JobKind::JobStop);
        stop.set_id(2);
        table.publish(&stop).unwrap();
        let installed = table.install(&stop, &NopNotifier);

        assert!(Rc::ptr_eq(&installed, &stop));
        assert_eq!(start.state(), JobState::JobCanceled);
        assert!(table.get_by_id(1).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn table_finish_removes_job() {
        let table = JobTable::new();
        let unit = UnitX::new(UnitType::UnitService, "test1.service");
        let job = Job::new(&unit, JobKind::JobStart);
        job.set_id(1);
        table.publish(&job).unwrap();
        table.install(&job, &NopNotifier);

        table.finish_job(&job, JobState::JobCanceled, &NopNotifier);
        assert!(table.is_empty());
        assert!(table.get_by_id(1).is_none());
        assert_eq!(job.state(), JobState::JobCanceled);
    }
}
