//! Domain enums shared between the DB and API layers.

mod audit;
mod role;
mod state;
mod year_group;

pub use audit::AuditAction;
pub use role::Role;
pub use state::ElectionState;
pub use year_group::YearGroup;
