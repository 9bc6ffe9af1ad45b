use super::job_entry::Job;
use std::rc::Rc;

/// The applier's side effects, implemented by the embedding manager.
///
/// The four install hooks fire in declaration order for every job the
/// transaction touched; `job_finished` fires for jobs the applier cancels
/// while isolating or flushing. Implementations enqueue, they do not run
/// anything synchronously.
pub trait JobNotifier {
    /// put the job on the run queue
    fn enqueue_run(&self, job: &Rc<Job>);

    /// tell observers the job appeared or changed
    fn notify(&self, job: &Rc<Job>);

    /// arm the job's timeout
    fn start_timer(&self, job: &Rc<Job>);

    /// kind-specific install side effect, e.g. shutdown sequencing
    fn shutdown_magic(&self, job: &Rc<Job>);

    /// an installed job left the table without running
    fn job_finished(&self, job: &Rc<Job>);
}

/// a notifier that swallows everything; handy for callers that only plan
pub struct NopNotifier;

impl JobNotifier for NopNotifier {
    fn enqueue_run(&self, _job: &Rc<Job>) {}

    fn notify(&self, _job: &Rc<Job>) {}

    fn start_timer(&self, _job: &Rc<Job>) {}

    fn shutdown_magic(&self, _job: &Rc<Job>) {}

    fn job_finished(&self, _job: &Rc<Job>) {}
}
