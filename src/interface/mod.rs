pub mod controller;
pub mod transport;
