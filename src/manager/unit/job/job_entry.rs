use crate::manager::data::UnitActiveState;
use crate::manager::unit::unit_entry::UnitX;
use crate::manager::unit::unit_relation_atom::UnitRelationAtom;
use once_cell::sync::Lazy;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use strum::{Display, EnumIter};

/// the closed set of job kinds
///
/// `JobReloadOrStart` only ever exists as an intermediate merge result and is
/// collapsed against the unit before it is stored anywhere.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash, Display, EnumIter)]
pub enum JobKind {
    ///
    JobStart,
    ///
    JobVerify,
    ///
    JobStop,
    ///
    JobReload,
    ///
    JobRestart,

    // request-only kinds, decay on transaction entry
    ///
    JobTryRestart,
    ///
    JobTryReload,
    ///
    JobTryReloadOrRestart,

    // merge-only kind, never stored
    ///
    JobReloadOrStart,

    ///
    JobNop,
}

/// states of an installed job; a job in a transaction is always `JobWaiting`
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum JobState {
    ///
    JobWaiting,
    ///
    JobRunning,
    ///
    JobDone,
    ///
    JobCanceled,
    ///
    JobFailed,
    ///
    JobDependency,
    ///
    JobSkipped,
    ///
    JobInvalid,
    ///
    JobAssert,
    ///
    JobUnsupported,
    ///
    JobCollected,
    ///
    JobOnce,
}

/// a job request: which unit, which kind
#[derive(Clone)]
pub struct JobConf {
    unit: Rc<UnitX>,
    kind: JobKind,
}

impl JobConf {
    pub fn new(unit: &Rc<UnitX>, kind: JobKind) -> JobConf {
        JobConf {
            unit: Rc::clone(unit),
            kind,
        }
    }

    /// the same request with its kind collapsed against the unit's state
    pub(super) fn map(input: &JobConf) -> JobConf {
        let kind = job_kind_collapse(input.kind, &input.unit);
        JobConf {
            unit: Rc::clone(&input.unit),
            kind,
        }
    }

    ///
    pub fn get_unit(&self) -> &Rc<UnitX> {
        &self.unit
    }

    ///
    pub fn get_kind(&self) -> JobKind {
        self.kind
    }
}

/// An installed job, the entity living in the live job table.
///
/// Shared between the table and whoever executes it; all mutable attributes
/// sit behind `Cell`.
pub struct Job {
    // associated objects
    unit: Rc<UnitX>,

    // owned attributes
    id: Cell<u32>,
    kind: Cell<JobKind>,
    state: Cell<JobState>,
    irreversible: Cell<bool>,
    ignore_order: Cell<bool>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id.get())
            .field("unit", self.unit.id())
            .field("kind", &self.kind.get())
            .field("state", &self.state.get())
            .finish()
    }
}

impl Job {
    pub(super) fn new(unit: &Rc<UnitX>, kind: JobKind) -> Rc<Job> {
        Rc::new(Job {
            unit: Rc::clone(unit),
            id: Cell::new(0),
            kind: Cell::new(kind),
            state: Cell::new(JobState::JobWaiting),
            irreversible: Cell::new(false),
            ignore_order: Cell::new(false),
        })
    }

    ///
    pub fn id(&self) -> u32 {
        self.id.get()
    }

    pub(super) fn set_id(&self, id: u32) {
        self.id.set(id);
    }

    ///
    pub fn unit(&self) -> &Rc<UnitX> {
        &self.unit
    }

    ///
    pub fn kind(&self) -> JobKind {
        self.kind.get()
    }

    ///
    pub fn state(&self) -> JobState {
        self.state.get()
    }

    pub(super) fn set_state(&self, state: JobState) {
        self.state.set(state);
    }

    ///
    pub fn irreversible(&self) -> bool {
        self.irreversible.get()
    }

    pub(super) fn set_irreversible(&self, irreversible: bool) {
        self.irreversible.set(irreversible);
    }

    ///
    pub fn ignore_order(&self) -> bool {
        self.ignore_order.get()
    }

    pub(super) fn set_ignore_order(&self, ignore_order: bool) {
        self.ignore_order.set(ignore_order);
    }

    /// fold `other` into this already-installed job; the caller has ruled out
    /// a conflict, so the merge is expected to succeed
    pub(super) fn merge_into_installed(&self, other: JobKind) -> bool {
        match job_merge_and_collapse(self.kind.get(), other, &self.unit) {
            Some(kind) => {
                self.kind.set(kind);
                true
            }
            None => false,
        }
    }
}

type MergeTable = HashMap<(JobKind, JobKind), JobKind>;

// the commutative half; symmetry and idempotence are filled in below
static JOB_MERGE_TABLE: Lazy<MergeTable> = Lazy::new(|| {
    let seed = [
        ((JobKind::JobStart, JobKind::JobVerify), JobKind::JobStart),
        (
            (JobKind::JobStart, JobKind::JobReload),
            JobKind::JobReloadOrStart,
        ),
        ((JobKind::JobStart, JobKind::JobRestart), JobKind::JobRestart),
        ((JobKind::JobVerify, JobKind::JobReload), JobKind::JobReload),
        (
            (JobKind::JobVerify, JobKind::JobRestart),
            JobKind::JobRestart,
        ),
        (
            (JobKind::JobReload, JobKind::JobRestart),
            JobKind::JobRestart,
        ),
    ];

    let mut t = MergeTable::new();
    for ((a, b), r) in seed.iter() {
        t.insert((*a, *b), *r);
        t.insert((*b, *a), *r);
    }
    for k in [
        JobKind::JobStart,
        JobKind::JobVerify,
        JobKind::JobStop,
        JobKind::JobReload,
        JobKind::JobRestart,
        JobKind::JobNop,
    ] {
        t.insert((k, k), k);
    }
    t
});

/// the commutative, associative, idempotent reduction over job kinds; `None`
/// marks the unmergeable pairs (a stop against anything positive)
pub(super) fn job_merge(a: JobKind, b: JobKind) -> Option<JobKind> {
    JOB_MERGE_TABLE.get(&(a, b)).copied()
}

pub(super) fn job_is_mergeable(a: JobKind, b: JobKind) -> bool {
    job_merge(a, b).is_some()
}

/// merge, then collapse an intermediate result against the unit
pub(super) fn job_merge_and_collapse(a: JobKind, b: JobKind, unit: &UnitX) -> Option<JobKind> {
    job_merge(a, b).map(|kind| job_kind_collapse(kind, unit))
}

/// specialise a generic kind against the unit's current state and abilities
pub(super) fn job_kind_collapse(kind: JobKind, unit: &UnitX) -> JobKind {
    let state = unit.current_active_state();
    match kind {
        JobKind::JobTryRestart => {
            if state.is_active_or_activating() {
                JobKind::JobRestart
            } else {
                JobKind::JobNop
            }
        }
        JobKind::JobTryReload => {
            if state == UnitActiveState::UnitActive {
                job_kind_collapse(JobKind::JobReload, unit)
            } else {
                JobKind::JobNop
            }
        }
        JobKind::JobTryReloadOrRestart => {
            if !state.is_active_or_activating() {
                JobKind::JobNop
            } else if unit.can_reload() {
                JobKind::JobReload
            } else {
                JobKind::JobRestart
            }
        }
        JobKind::JobReloadOrStart => {
            if state.is_active_or_activating() {
                job_kind_collapse(JobKind::JobReload, unit)
            } else {
                JobKind::JobStart
            }
        }
        JobKind::JobReload => {
            if unit.can_reload() {
                JobKind::JobReload
            } else if unit.can_start() && unit.can_stop() {
                JobKind::JobRestart
            } else {
                JobKind::JobNop
            }
        }
        kind => kind,
    }
}

/// would running `a` cancel `b`?
pub(super) fn job_is_conflicting(a: JobKind, b: JobKind) -> bool {
    a != b && (a == JobKind::JobStop || b == JobKind::JobStop)
}

/// is issuing `kind` against a unit in `state` a no-op?
pub(super) fn job_is_redundant(kind: JobKind, state: UnitActiveState) -> bool {
    match kind {
        JobKind::JobStart | JobKind::JobVerify => matches!(
            state,
            UnitActiveState::UnitActive | UnitActiveState::UnitReloading
        ),
        JobKind::JobStop => state.is_inactive_or_failed(),
        JobKind::JobReload => state == UnitActiveState::UnitReloading,
        JobKind::JobRestart => false,
        JobKind::JobNop => true,
        // request-only and merge-only kinds never reach the redundancy check
        _ => false,
    }
}

/// is `kind` something this unit can be asked to do at all?
pub(super) fn job_is_unit_applicable(kind: JobKind, unit: &UnitX) -> bool {
    match kind {
        JobKind::JobStart | JobKind::JobVerify | JobKind::JobNop => true,
        JobKind::JobStop => true,
        JobKind::JobRestart | JobKind::JobTryRestart => unit.can_start() && unit.can_stop(),
        JobKind::JobReload | JobKind::JobTryReload => {
            unit.can_reload() || (unit.can_start() && unit.can_stop())
        }
        JobKind::JobReloadOrStart => unit.can_start(),
        JobKind::JobTryReloadOrRestart => unit.can_reload() || (unit.can_start() && unit.can_stop()),
    }
}

/// a kind is "positive" when it brings the unit up or keeps it up
fn job_kind_is_positive(kind: JobKind) -> bool {
    matches!(
        kind,
        JobKind::JobStart | JobKind::JobVerify | JobKind::JobReload
    )
}

/// Compare two jobs linked by an ordering atom, in job execution order.
///
/// `atom` is the relation seen from `a`'s unit towards `b`'s unit. Returns a
/// negative value when `a` runs first, positive when `b` runs first, zero
/// when the pair is unordered. Stopping reverses the configured direction,
/// and a stopping job always precedes a starting one on the same edge.
pub(super) fn job_order_compare(a: JobKind, b: JobKind, atom: UnitRelationAtom) -> i32 {
    assert!(matches!(
        atom,
        UnitRelationAtom::UnitAtomBefore | UnitRelationAtom::UnitAtomAfter
    ));

    if a == JobKind::JobNop || b == JobKind::JobNop {
        return 0;
    }

    let a_positive = job_kind_is_positive(a);
    let b_positive = job_kind_is_positive(b);
    if a_positive == b_positive {
        let configured = match atom {
            UnitRelationAtom::UnitAtomBefore => -1,
            _ => 1,
        };
        // two stops run in the reverse of the configured order
        return if a_positive { configured } else { -configured };
    }

    if a_positive {
        1
    } else {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::data::UnitActiveState;
    use crate::manager::unit::unit_entry::{UnitType, UnitX};
    use strum::IntoEnumIterator;

    fn transaction_kinds() -> Vec<JobKind> {
        vec![
            JobKind::JobStart,
            JobKind::JobVerify,
            JobKind::JobStop,
            JobKind::JobReload,
            JobKind::JobRestart,
            JobKind::JobNop,
        ]
    }

    #[test]
    fn merge_is_commutative() {
        for a in JobKind::iter() {
            for b in JobKind::iter() {
                assert_eq!(job_merge(a, b), job_merge(b, a), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn merge_is_idempotent() {
        for k in transaction_kinds() {
            assert_eq!(job_merge(k, k), Some(k));
        }
    }

    #[test]
    fn merge_is_associative_where_defined() {
        for a in transaction_kinds() {
            for b in transaction_kinds() {
                for c in transaction_kinds() {
                    let left = job_merge(a, b).and_then(|ab| job_merge(ab, c));
                    let right = job_merge(b, c).and_then(|bc| job_merge(a, bc));
                    if left.is_some() && right.is_some() {
                        assert_eq!(left, right, "({} + {}) + {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn merge_rejects_stop_against_positive() {
        assert_eq!(job_merge(JobKind::JobStop, JobKind::JobStart), None);
        assert_eq!(job_merge(JobKind::JobStop, JobKind::JobReload), None);
        assert_eq!(job_merge(JobKind::JobStop, JobKind::JobVerify), None);
        assert_eq!(job_merge(JobKind::JobStop, JobKind::JobRestart), None);
        assert_eq!(
            job_merge(JobKind::JobStop, JobKind::JobStop),
            Some(JobKind::JobStop)
        );
    }

    #[test]
    fn merge_start_with_reload_collapses_by_state() {
        let unit = UnitX::new(UnitType::UnitService, "test1.service");
        assert_eq!(
            job_merge(JobKind::JobStart, JobKind::JobReload),
            Some(JobKind::JobReloadOrStart)
        );

        unit.set_active_state(UnitActiveState::UnitInActive);
        assert_eq!(
            job_merge_and_collapse(JobKind::JobStart, JobKind::JobReload, &unit),
            Some(JobKind::JobStart)
        );

        unit.set_active_state(UnitActiveState::UnitActive);
        assert_eq!(
            job_merge_and_collapse(JobKind::JobStart, JobKind::JobReload, &unit),
            Some(JobKind::JobReload)
        );
    }

    #[test]
    fn collapse_try_kinds() {
        let unit = UnitX::new(UnitType::UnitService, "test1.service");

        unit.set_active_state(UnitActiveState::UnitInActive);
        assert_eq!(
            job_kind_collapse(JobKind::JobTryRestart, &unit),
            JobKind::JobNop
        );
        assert_eq!(
            job_kind_collapse(JobKind::JobTryReload, &unit),
            JobKind::JobNop
        );
        assert_eq!(
            job_kind_collapse(JobKind::JobTryReloadOrRestart, &unit),
            JobKind::JobNop
        );

        unit.set_active_state(UnitActiveState::UnitActivating);
        assert_eq!(
            job_kind_collapse(JobKind::JobTryRestart, &unit),
            JobKind::JobRestart
        );

        unit.set_active_state(UnitActiveState::UnitActive);
        assert_eq!(
            job_kind_collapse(JobKind::JobTryReload, &unit),
            JobKind::JobReload
        );
        assert_eq!(
            job_kind_collapse(JobKind::JobTryReloadOrRestart, &unit),
            JobKind::JobReload
        );

        unit.set_can_reload(false);
        assert_eq!(
            job_kind_collapse(JobKind::JobTryReloadOrRestart, &unit),
            JobKind::JobRestart
        );
    }

    #[test]
    fn collapse_reload_against_no_reload_unit() {
        let unit = UnitX::new(UnitType::UnitService, "test1.service");
        unit.set_can_reload(false);
        assert_eq!(
            job_kind_collapse(JobKind::JobReload, &unit),
            JobKind::JobRestart
        );

        unit.set_can_start(false);
        assert_eq!(job_kind_collapse(JobKind::JobReload, &unit), JobKind::JobNop);
    }

    #[test]
    fn redundancy_follows_unit_state() {
        assert!(job_is_redundant(
            JobKind::JobStart,
            UnitActiveState::UnitActive
        ));
        assert!(job_is_redundant(
            JobKind::JobVerify,
            UnitActiveState::UnitReloading
        ));
        assert!(job_is_redundant(
            JobKind::JobStop,
            UnitActiveState::UnitInActive
        ));
        assert!(job_is_redundant(
            JobKind::JobStop,
            UnitActiveState::UnitFailed
        ));
        assert!(!job_is_redundant(
            JobKind::JobStart,
            UnitActiveState::UnitInActive
        ));
        assert!(!job_is_redundant(
            JobKind::JobRestart,
            UnitActiveState::UnitActive
        ));
        assert!(job_is_redundant(
            JobKind::JobNop,
            UnitActiveState::UnitMaintenance
        ));
    }

    #[test]
    fn conflicts_are_stop_versus_rest() {
        assert!(job_is_conflicting(JobKind::JobStart, JobKind::JobStop));
        assert!(job_is_conflicting(JobKind::JobStop, JobKind::JobRestart));
        assert!(!job_is_conflicting(JobKind::JobStop, JobKind::JobStop));
        assert!(!job_is_conflicting(JobKind::JobStart, JobKind::JobReload));
    }

    #[test]
    fn applicability_respects_unit_abilities() {
        let target = UnitX::new(UnitType::UnitTarget, "basic.target");
        assert!(job_is_unit_applicable(JobKind::JobStart, &target));
        assert!(job_is_unit_applicable(JobKind::JobStop, &target));
        // a target can still fall back to restart for a reload request
        assert!(job_is_unit_applicable(JobKind::JobReload, &target));

        target.set_can_start(false);
        assert!(!job_is_unit_applicable(JobKind::JobRestart, &target));
        assert!(!job_is_unit_applicable(JobKind::JobReload, &target));
    }

    #[test]
    fn order_compare_direction() {
        let before = UnitRelationAtom::UnitAtomBefore;
        let after = UnitRelationAtom::UnitAtomAfter;

        // two starts follow the configured order
        assert!(job_order_compare(JobKind::JobStart, JobKind::JobStart, before) < 0);
        assert!(job_order_compare(JobKind::JobStart, JobKind::JobStart, after) > 0);

        // two stops reverse it
        assert!(job_order_compare(JobKind::JobStop, JobKind::JobStop, before) > 0);
        assert!(job_order_compare(JobKind::JobStop, JobKind::JobStop, after) < 0);

        // a stop runs before a start whatever the configuration says
        assert!(job_order_compare(JobKind::JobStop, JobKind::JobStart, before) < 0);
        assert!(job_order_compare(JobKind::JobStop, JobKind::JobStart, after) < 0);
        assert!(job_order_compare(JobKind::JobStart, JobKind::JobStop, after) > 0);

        // nop is unordered
        assert_eq!(
            job_order_compare(JobKind::JobNop, JobKind::JobStart, before),
            0
        );
    }

    #[test]
    fn conf_map_collapses() {
        let unit = UnitX::new(UnitType::UnitService, "test1.service");
        unit.set_active_state(UnitActiveState::UnitActive);
        let conf = JobConf::new(&unit, JobKind::JobTryRestart);
        assert_eq!(JobConf::map(&conf).get_kind(), JobKind::JobRestart);
    }
}
