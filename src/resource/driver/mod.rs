pub mod rest_api;
pub mod udp;
