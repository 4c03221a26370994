//! OFSC API services.

mod activities;
mod resources;
mod users;
mod work_zones;

pub use activities::*;
pub use resources::*;
pub use users::*;
pub use work_zones::*;
