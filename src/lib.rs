//! jobtrans - a transactional job planner for a unit manager.
//!
//! A caller describes a desired end-state ("activate unit U") and the planner
//! turns it into a consistent set of start/stop/reload/restart/verify jobs
//! over the graph of interdependent units, then commits that set atomically
//! into the running job table.
//!
//! The crate performs no I/O and keeps no persistent state; executing the
//! installed jobs is the embedding manager's business.

pub mod manager;

pub use manager::data::{JobMode, UnitActiveState, UnitLoadState, UnitNotifyFlags};
pub use manager::unit::job::{
    Job, JobAffect, JobAlloc, JobConf, JobErrno, JobIdx, JobKind, JobManager, JobNotifier,
    JobState, JobTable, JobTransaction, NopNotifier,
};
pub use manager::unit::{UnitDb, UnitRelationAtom, UnitRelations, UnitType, UnitX};
