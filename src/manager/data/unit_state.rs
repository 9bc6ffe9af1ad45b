use bitflags::bitflags;

/**Unit active states:
 A[UnitActive]
 B[UnitReloading]
 C[UnitInActive]
 D[UnitFailed]
 E[UnitActivating]
 F[UnitDeActivating]
 G[UnitMaintenance]
 ```graph LR
C[UnitInActive] -> E[UnitActivating]
E->A[UnitActive]
B[UnitReloading] -> E
E->F[UnitDeActivating]
E->D[UnitFailed]
```
*/
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum UnitActiveState {
    ///
    UnitActive,
    ///
    UnitReloading,
    ///
    UnitInActive,
    ///
    UnitFailed,
    ///
    UnitActivating,
    ///
    UnitDeActivating,
    ///
    UnitMaintenance,
}

impl UnitActiveState {
    /// the unit is up, or on its way up
    pub fn is_active_or_activating(&self) -> bool {
        matches!(
            self,
            UnitActiveState::UnitActive
                | UnitActiveState::UnitActivating
                | UnitActiveState::UnitReloading
        )
    }

    /// the unit is down and not on its way anywhere
    pub fn is_inactive_or_failed(&self) -> bool {
        matches!(
            self,
            UnitActiveState::UnitInActive | UnitActiveState::UnitFailed
        )
    }
}

/// load states of a unit; only `UnitLoaded` accepts non-stop jobs
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum UnitLoadState {
    ///
    UnitStub,
    ///
    UnitLoaded,
    ///
    UnitNotFound,
    ///
    UnitBadSetting,
    ///
    UnitError,
    ///
    UnitMasked,
    ///
    UnitMerged,
}

bitflags! {
    ///
    pub struct UnitNotifyFlags: u8 {
        ///
        const UNIT_NOTIFY_SUCCESS = 1 << 0;
        ///
        const UNIT_NOTIFY_RELOAD_FAILURE = 1 << 1;
        ///
        const UNIT_NOTIFY_WILL_AUTO_RESTART = 1 << 2;
    }
}
