pub mod backend;
pub mod injector;
pub mod state;

pub use backend::{
    create_backend, detect_backend, interpret_backend_response, select_backend, BackendContext,
    EmulatorInjector, GenericInjector, LocationBackend,
};
pub use injector::{LocationInjector, SpeedProfile, DEFAULT_MOVE_STEPS};
pub use state::{BackendKind, CurrentLocation, DeviceLocationState, MockState};
