pub use unit_datastore::UnitDb;
pub use unit_entry::{UnitType, UnitX};
pub use unit_relation::UnitRelations;
pub use unit_relation_atom::UnitRelationAtom;

pub mod job;

mod unit_datastore;
mod unit_dep;
mod unit_entry;
mod unit_relation;
mod unit_relation_atom;
mod unit_sets;
