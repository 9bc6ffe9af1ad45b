use super::unit_entry::UnitX;
use super::unit_relation::{self, UnitRelations};
use super::unit_relation_atom::{self, UnitRelationAtom};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// the live dependency edges between units, keyed by source unit id
///
/// Inserting an edge records its inverse on the destination as well, so a
/// `Before` becomes visible as an `After` from the other side. Per-relation
/// destination lists keep insertion order; the planner relies on that for
/// reproducible traversals.
pub(super) struct UnitDep {
    t: RefCell<HashMap<String, HashMap<UnitRelations, Vec<Rc<UnitX>>>>>,
}

impl UnitDep {
    pub(super) fn new() -> UnitDep {
        UnitDep {
            t: RefCell::new(HashMap::new()),
        }
    }

    pub(super) fn insert(&self, source: &Rc<UnitX>, relation: UnitRelations, dest: &Rc<UnitX>) {
        self.insert_one(source, relation, dest);
        if let Some(inverse) = unit_relation::unit_relation_to_inverse(relation) {
            self.insert_one(dest, inverse, source);
        }
    }

    pub(super) fn gets(&self, source: &UnitX, relation: UnitRelations) -> Vec<Rc<UnitX>> {
        let t = self.t.borrow();
        t.get(source.id())
            .and_then(|rels| rels.get(&relation))
            .map(|units| units.to_vec())
            .unwrap_or_default()
    }

    pub(super) fn gets_atom(&self, source: &UnitX, atom: UnitRelationAtom) -> Vec<Rc<UnitX>> {
        let mut units: Vec<Rc<UnitX>> = Vec::new();
        for relation in unit_relation_atom::unit_relation_from_atom(atom).iter() {
            for other in self.gets(source, *relation).into_iter() {
                if !units.iter().any(|u| u.id() == other.id()) {
                    units.push(other);
                }
            }
        }
        units
    }

    fn insert_one(&self, source: &Rc<UnitX>, relation: UnitRelations, dest: &Rc<UnitX>) {
        let mut t = self.t.borrow_mut();
        let dests = t
            .entry(source.id().clone())
            .or_insert_with(HashMap::new)
            .entry(relation)
            .or_insert_with(Vec::new);
        if !dests.iter().any(|u| u.id() == dest.id()) {
            dests.push(Rc::clone(dest));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UnitDep;
    use crate::manager::unit::unit_entry::{UnitType, UnitX};
    use crate::manager::unit::unit_relation::UnitRelations;
    use crate::manager::unit::unit_relation_atom::UnitRelationAtom;

    #[test]
    fn dep_insert_records_inverse() {
        let dep = UnitDep::new();
        let u1 = UnitX::new(UnitType::UnitService, "test1.service");
        let u2 = UnitX::new(UnitType::UnitService, "test2.service");
        dep.insert(&u1, UnitRelations::UnitRequires, &u2);

        let forward = dep.gets(&u1, UnitRelations::UnitRequires);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].id(), "test2.service");

        let inverse = dep.gets(&u2, UnitRelations::UnitRequiresBy);
        assert_eq!(inverse.len(), 1);
        assert_eq!(inverse[0].id(), "test1.service");
    }

    #[test]
    fn dep_gets_atom_unions_in_insertion_order() {
        let dep = UnitDep::new();
        let u1 = UnitX::new(UnitType::UnitService, "test1.service");
        let u2 = UnitX::new(UnitType::UnitService, "test2.service");
        let u3 = UnitX::new(UnitType::UnitService, "test3.service");
        dep.insert(&u1, UnitRelations::UnitRequires, &u2);
        dep.insert(&u1, UnitRelations::UnitBindsTo, &u3);
        dep.insert(&u1, UnitRelations::UnitBindsTo, &u2); // duplicate target

        let pulled = dep.gets_atom(&u1, UnitRelationAtom::UnitAtomPullInStart);
        let names: Vec<&str> = pulled.iter().map(|u| u.id().as_str()).collect();
        assert_eq!(names, vec!["test2.service", "test3.service"]);
    }

    #[test]
    fn dep_ordering_is_bidirectional() {
        let dep = UnitDep::new();
        let u1 = UnitX::new(UnitType::UnitService, "test1.service");
        let u2 = UnitX::new(UnitType::UnitService, "test2.service");
        dep.insert(&u1, UnitRelations::UnitBefore, &u2);

        assert_eq!(dep.gets_atom(&u1, UnitRelationAtom::UnitAtomBefore).len(), 1);
        assert_eq!(dep.gets_atom(&u2, UnitRelationAtom::UnitAtomAfter).len(), 1);
    }
}
