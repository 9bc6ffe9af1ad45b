use super::unit_relation::UnitRelations;

/// semantic tags over the raw relation set; the planner traverses atoms only
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum UnitRelationAtom {
    /// a start job pulls in a mandatory start of these
    UnitAtomPullInStart,
    /// a start job pulls in an opportunistic start of these
    UnitAtomPullInStartIgnored,
    /// a start job pulls in a verify-active of these
    UnitAtomPullInVerify,
    /// a start job pulls in a mandatory stop of these
    UnitAtomPullInStop,
    /// a start job pulls in an opportunistic stop of these
    UnitAtomPullInStopIgnored,
    /// a stop job propagates to these
    UnitAtomPropagateStop,
    /// a restart job propagates to these as try-restart
    UnitAtomPropagateRestart,
    /// a reload job propagates to these as try-reload
    UnitAtomPropagatesReloadTo,
    /// units triggering this one
    UnitAtomTriggeredBy,
    /// units this one triggers
    UnitAtomTriggers,
    /// ordering, this unit first
    UnitAtomBefore,
    /// ordering, this unit last
    UnitAtomAfter,
}

pub(super) fn unit_relation_from_atom(atom: UnitRelationAtom) -> Vec<UnitRelations> {
    match atom {
        UnitRelationAtom::UnitAtomPullInStart => vec![
            UnitRelations::UnitRequires,
            UnitRelations::UnitBindsTo,
        ],
        UnitRelationAtom::UnitAtomPullInStartIgnored => vec![UnitRelations::UnitWants],
        UnitRelationAtom::UnitAtomPullInVerify => vec![UnitRelations::UnitRequisite],
        UnitRelationAtom::UnitAtomPullInStop => vec![UnitRelations::UnitConflicts],
        UnitRelationAtom::UnitAtomPullInStopIgnored => vec![UnitRelations::UnitConflictedBy],
        UnitRelationAtom::UnitAtomPropagateStop => vec![
            UnitRelations::UnitRequiresBy,
            UnitRelations::UnitBoundBy,
            UnitRelations::UnitConsistsOf,
        ],
        UnitRelationAtom::UnitAtomPropagateRestart => vec![
            UnitRelations::UnitRequiresBy,
            UnitRelations::UnitBoundBy,
        ],
        UnitRelationAtom::UnitAtomPropagatesReloadTo => {
            vec![UnitRelations::UnitPropagatesReloadTo]
        }
        UnitRelationAtom::UnitAtomTriggeredBy => vec![UnitRelations::UnitTriggeredBy],
        UnitRelationAtom::UnitAtomTriggers => vec![UnitRelations::UnitTriggers],
        UnitRelationAtom::UnitAtomBefore => vec![UnitRelations::UnitBefore],
        UnitRelationAtom::UnitAtomAfter => vec![UnitRelations::UnitAfter],
    }
}
