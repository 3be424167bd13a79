pub mod connection_state;
pub mod node_descriptor;
pub mod node_entity;
pub mod node_status;
pub mod records;
pub mod session;
