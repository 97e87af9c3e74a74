pub mod autonomy_actor;
pub mod messages;
pub mod store_actor;

pub use autonomy_actor::AutonomyHandle;
pub use store_actor::StoreHandle;
