pub use u_entry::{UnitType, UnitX};

// entry
mod u_entry;
