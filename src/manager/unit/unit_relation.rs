use strum::Display;

/// typed dependency edges between units, as written in unit configuration
#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash, Display)]
pub enum UnitRelations {
    ///
    UnitRequires,
    ///
    UnitRequisite,
    ///
    UnitWants,
    ///
    UnitBindsTo,
    ///
    UnitPartOf,

    ///
    UnitRequiresBy,
    ///
    UnitRequisiteOf,
    ///
    UnitWantsBy,
    ///
    UnitBoundBy,
    ///
    UnitConsistsOf,

    ///
    UnitConflicts,
    ///
    UnitConflictedBy,

    ///
    UnitBefore,
    ///
    UnitAfter,

    ///
    UnitTriggers,
    ///
    UnitTriggeredBy,

    ///
    UnitPropagatesReloadTo,
    ///
    UnitReloadPropagatedFrom,

    ///
    UnitFollows,
}

/// the other half of an edge; recording one direction implies the other
pub(super) fn unit_relation_to_inverse(relation: UnitRelations) -> Option<UnitRelations> {
    match relation {
        UnitRelations::UnitRequires => Some(UnitRelations::UnitRequiresBy),
        UnitRelations::UnitRequisite => Some(UnitRelations::UnitRequisiteOf),
        UnitRelations::UnitWants => Some(UnitRelations::UnitWantsBy),
        UnitRelations::UnitBindsTo => Some(UnitRelations::UnitBoundBy),
        UnitRelations::UnitPartOf => Some(UnitRelations::UnitConsistsOf),
        UnitRelations::UnitRequiresBy => Some(UnitRelations::UnitRequires),
        UnitRelations::UnitRequisiteOf => Some(UnitRelations::UnitRequisite),
        UnitRelations::UnitWantsBy => Some(UnitRelations::UnitWants),
        UnitRelations::UnitBoundBy => Some(UnitRelations::UnitBindsTo),
        UnitRelations::UnitConsistsOf => Some(UnitRelations::UnitPartOf),
        UnitRelations::UnitConflicts => Some(UnitRelations::UnitConflictedBy),
        UnitRelations::UnitConflictedBy => Some(UnitRelations::UnitConflicts),
        UnitRelations::UnitBefore => Some(UnitRelations::UnitAfter),
        UnitRelations::UnitAfter => Some(UnitRelations::UnitBefore),
        UnitRelations::UnitTriggers => Some(UnitRelations::UnitTriggeredBy),
        UnitRelations::UnitTriggeredBy => Some(UnitRelations::UnitTriggers),
        UnitRelations::UnitPropagatesReloadTo => Some(UnitRelations::UnitReloadPropagatedFrom),
        UnitRelations::UnitReloadPropagatedFrom => Some(UnitRelations::UnitPropagatesReloadTo),
        UnitRelations::UnitFollows => None,
    }
}
