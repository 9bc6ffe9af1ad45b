use super::unit_entry::UnitX;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// every unit the manager knows, by id; enumeration is insertion-ordered so
/// the isolate candidate walk is reproducible
pub(super) struct UnitSets {
    t: RefCell<HashMap<String, Rc<UnitX>>>,
    order: RefCell<Vec<String>>,
}

impl UnitSets {
    pub(super) fn new() -> UnitSets {
        UnitSets {
            t: RefCell::new(HashMap::new()),
            order: RefCell::new(Vec::new()),
        }
    }

    pub(super) fn insert(&self, name: String, unit: Rc<UnitX>) -> Option<Rc<UnitX>> {
        let old = self.t.borrow_mut().insert(name.clone(), unit);
        if old.is_none() {
            self.order.borrow_mut().push(name);
        }
        old
    }

    pub(super) fn get(&self, name: &str) -> Option<Rc<UnitX>> {
        self.t.borrow().get(name).cloned()
    }

    pub(super) fn get_all(&self) -> Vec<Rc<UnitX>> {
        let t = self.t.borrow();
        self.order
            .borrow()
            .iter()
            .filter_map(|name| t.get(name).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::UnitSets;
    use crate::manager::unit::unit_entry::{UnitType, UnitX};
    use std::rc::Rc;

    #[test]
    fn sets_insert_get() {
        let sets = UnitSets::new();
        let u1 = UnitX::new(UnitType::UnitService, "test1.service");
        let u2 = UnitX::new(UnitType::UnitService, "test2.service");
        sets.insert(u1.id().clone(), Rc::clone(&u1));
        sets.insert(u2.id().clone(), Rc::clone(&u2));

        assert!(sets.get("test1.service").is_some());
        assert!(sets.get("test3.service").is_none());

        let all = sets.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), "test1.service");
        assert_eq!(all[1].id(), "test2.service");
    }
}
