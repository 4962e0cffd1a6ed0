pub mod aggregate;
pub mod ais;
pub mod bulk;
pub mod consent;
pub mod events;
pub mod fx;
pub mod participant;
pub mod saga;
