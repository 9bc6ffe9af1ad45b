use super::unit_dep::UnitDep;
use super::unit_entry::UnitX;
use super::unit_relation::UnitRelations;
use super::unit_relation_atom::UnitRelationAtom;
use super::unit_sets::UnitSets;
use std::cell::Cell;
use std::rc::Rc;

/// The read-only view the planner has of the unit system.
///
/// The planner never mutates units through this; registration methods exist
/// for the embedding manager to populate the store.
pub struct UnitDb {
    // owned objects
    units: UnitSets,
    dep: UnitDep,

    reloading: Cell<bool>,
}

impl Default for UnitDb {
    fn default() -> Self {
        UnitDb::new()
    }
}

impl UnitDb {
    pub fn new() -> UnitDb {
        UnitDb {
            units: UnitSets::new(),
            dep: UnitDep::new(),
            reloading: Cell::new(false),
        }
    }

    ///
    pub fn units_insert(&self, unit: Rc<UnitX>) -> Option<Rc<UnitX>> {
        self.units.insert(unit.id().clone(), unit)
    }

    ///
    pub fn units_get(&self, name: &str) -> Option<Rc<UnitX>> {
        self.units.get(name)
    }

    /// every registered unit, in registration order
    pub fn units_get_all(&self) -> Vec<Rc<UnitX>> {
        self.units.get_all()
    }

    ///
    pub fn dep_insert(&self, source: &Rc<UnitX>, relation: UnitRelations, dest: &Rc<UnitX>) {
        self.dep.insert(source, relation, dest);
    }

    /// units reachable from `source` along the relations of `atom`
    pub fn dep_gets_atom(&self, source: &UnitX, atom: UnitRelationAtom) -> Vec<Rc<UnitX>> {
        self.dep.gets_atom(source, atom)
    }

    /// whether the manager is between reload and coldplug completion
    pub fn is_reloading(&self) -> bool {
        self.reloading.get()
    }

    ///
    pub fn set_reloading(&self, reloading: bool) {
        self.reloading.set(reloading);
    }
}
