pub mod configuration;
pub use configuration::Config;

pub mod data_capture;
pub use data_capture::Recorder;

pub mod error_handling;

pub mod network;
pub use network::IngestListener;

pub mod packet;

pub mod web_interface;
pub use web_interface::WebServer;
