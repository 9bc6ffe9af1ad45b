use crate::manager::data::{UnitActiveState, UnitLoadState, UnitNotifyFlags};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use strum::Display;

/// kinds of units the planner can be asked about
#[derive(Eq, PartialEq, Clone, Copy, Debug, Display)]
pub enum UnitType {
    ///
    UnitService,
    ///
    UnitTarget,
    ///
    UnitSocket,
    ///
    UnitMount,
}

/// The planner-facing view of a unit.
///
/// The planner only ever reads a unit; the setters exist for the embedding
/// manager (and tests) to keep the view current. Jobs reference units
/// non-owningly, so a `UnitX` outlives any job attached to it.
pub struct UnitX {
    // identity
    id: String,
    unit_type: UnitType,

    // observable state
    active_state: RefCell<UnitActiveState>,
    staged_state: RefCell<Option<UnitActiveState>>,
    load_state: RefCell<UnitLoadState>,

    // per-unit policy flags
    ignore_on_isolate: Cell<bool>,
    can_start: Cell<bool>,
    can_stop: Cell<bool>,
    can_reload: Cell<bool>,

    // units mirroring this one (device aliases and the like)
    followers: RefCell<Vec<Rc<UnitX>>>,
}

impl PartialEq for UnitX {
    fn eq(&self, other: &Self) -> bool {
        self.unit_type == other.unit_type && self.id == other.id
    }
}

impl Eq for UnitX {}

impl PartialOrd for UnitX {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UnitX {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for UnitX {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl UnitX {
    pub fn new(unit_type: UnitType, name: &str) -> Rc<UnitX> {
        Rc::new(UnitX {
            id: String::from(name),
            unit_type,
            active_state: RefCell::new(UnitActiveState::UnitInActive),
            staged_state: RefCell::new(None),
            load_state: RefCell::new(UnitLoadState::UnitLoaded),
            ignore_on_isolate: Cell::new(false),
            can_start: Cell::new(true),
            can_stop: Cell::new(true),
            can_reload: Cell::new(unit_type != UnitType::UnitTarget),
            followers: RefCell::new(Vec::new()),
        })
    }

    ///
    pub fn id(&self) -> &String {
        &self.id
    }

    ///
    pub fn unit_type(&self) -> UnitType {
        self.unit_type
    }

    ///
    pub fn current_active_state(&self) -> UnitActiveState {
        *self.active_state.borrow()
    }

    ///
    pub fn set_active_state(&self, state: UnitActiveState) {
        *self.active_state.borrow_mut() = state;
    }

    /// the executor's state-change report; keeps the planner's view current
    pub fn notify(
        &self,
        original_state: UnitActiveState,
        new_state: UnitActiveState,
        flags: UnitNotifyFlags,
    ) {
        if original_state != new_state {
            log::debug!(
                "unit {} active state change from: {:?} to {:?}, flags: {:?}",
                self.id,
                original_state,
                new_state,
                flags
            );
        }
        self.set_active_state(new_state);
    }

    /// park a state observed while the manager reloads; `coldplug` applies it
    pub fn stage_active_state(&self, state: UnitActiveState) {
        *self.staged_state.borrow_mut() = Some(state);
    }

    /// bring the view up to date before the planner consults it
    pub fn coldplug(&self) {
        if let Some(state) = self.staged_state.borrow_mut().take() {
            *self.active_state.borrow_mut() = state;
        }
    }

    ///
    pub fn load_state(&self) -> UnitLoadState {
        *self.load_state.borrow()
    }

    ///
    pub fn set_load_state(&self, state: UnitLoadState) {
        *self.load_state.borrow_mut() = state;
    }

    ///
    pub fn is_load_complete(&self) -> bool {
        self.load_state() == UnitLoadState::UnitLoaded
    }

    /// one more look at the load state; the single retry the builder grants
    pub fn try_load(&self) -> bool {
        self.is_load_complete()
    }

    ///
    pub fn ignore_on_isolate(&self) -> bool {
        self.ignore_on_isolate.get()
    }

    ///
    pub fn set_ignore_on_isolate(&self, ignore_on_isolate: bool) {
        self.ignore_on_isolate.set(ignore_on_isolate);
    }

    ///
    pub fn can_start(&self) -> bool {
        self.can_start.get()
    }

    ///
    pub fn set_can_start(&self, can_start: bool) {
        self.can_start.set(can_start);
    }

    ///
    pub fn can_stop(&self) -> bool {
        self.can_stop.get()
    }

    ///
    pub fn set_can_stop(&self, can_stop: bool) {
        self.can_stop.set(can_stop);
    }

    ///
    pub fn can_reload(&self) -> bool {
        self.can_reload.get()
    }

    ///
    pub fn set_can_reload(&self, can_reload: bool) {
        self.can_reload.set(can_reload);
    }

    ///
    pub fn followers(&self) -> Vec<Rc<UnitX>> {
        self.followers.borrow().iter().map(Rc::clone).collect()
    }

    /// register `follower` as mirroring this unit
    pub fn add_follower(&self, follower: &Rc<UnitX>) {
        let mut followers = self.followers.borrow_mut();
        if !followers.iter().any(|u| u.id() == follower.id()) {
            followers.push(Rc::clone(follower));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{UnitType, UnitX};
    use crate::manager::data::{UnitActiveState, UnitLoadState};

    #[test]
    fn unit_state_accessors() {
        let unit = UnitX::new(UnitType::UnitService, "test1.service");
        assert_eq!(unit.current_active_state(), UnitActiveState::UnitInActive);
        assert!(unit.is_load_complete());

        unit.set_active_state(UnitActiveState::UnitActive);
        assert!(unit.current_active_state().is_active_or_activating());

        unit.set_load_state(UnitLoadState::UnitNotFound);
        assert!(!unit.try_load());
    }

    #[test]
    fn unit_coldplug_applies_staged_state() {
        let unit = UnitX::new(UnitType::UnitService, "test2.service");
        unit.stage_active_state(UnitActiveState::UnitActive);
        assert_eq!(unit.current_active_state(), UnitActiveState::UnitInActive);

        unit.coldplug();
        assert_eq!(unit.current_active_state(), UnitActiveState::UnitActive);

        unit.coldplug();
        assert_eq!(unit.current_active_state(), UnitActiveState::UnitActive);
    }

    #[test]
    fn unit_notify_updates_the_view() {
        let unit = UnitX::new(UnitType::UnitService, "test3.service");
        unit.notify(
            UnitActiveState::UnitInActive,
            UnitActiveState::UnitActive,
            crate::manager::data::UnitNotifyFlags::UNIT_NOTIFY_SUCCESS,
        );
        assert_eq!(unit.current_active_state(), UnitActiveState::UnitActive);
    }

    #[test]
    fn unit_target_cannot_reload() {
        let target = UnitX::new(UnitType::UnitTarget, "basic.target");
        assert!(!target.can_reload());
        assert!(target.can_start());
    }

    #[test]
    fn unit_followers_deduplicated() {
        let unit = UnitX::new(UnitType::UnitService, "main.service");
        let follower = UnitX::new(UnitType::UnitService, "alias.service");
        unit.add_follower(&follower);
        unit.add_follower(&follower);
        assert_eq!(unit.followers().len(), 1);
    }
}
