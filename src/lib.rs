pub mod protocol;
pub mod interfaces;
pub mod descriptor;
pub mod device_loader;
mod formatting;

pub use device_loader::{DeviceLoader, ModuleImage, TrackingState};

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .without_time()
        .with_env_filter(filter)
        .init();
}
