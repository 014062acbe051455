pub mod generator;
pub mod models;
pub mod store;

pub use generator::{path_distance, GeneratorSettings, RouteGenerator, RouteSpec};
pub use models::{ElevationProfile, LocationPoint, Route, Waypoint};
pub use store::{route_key, RouteStore};
