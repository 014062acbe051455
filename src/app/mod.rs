pub mod adb;
pub mod automation;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod geo;
pub mod history;
pub mod location;
pub mod logging;
pub mod models;
pub mod playback;
pub mod route;
pub mod session;
