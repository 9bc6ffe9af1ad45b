pub use job_mode::JobMode;
pub use unit_state::{UnitActiveState, UnitLoadState, UnitNotifyFlags};

mod job_mode;
mod unit_state;
