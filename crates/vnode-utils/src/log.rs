pub use log::{debug, error, info, trace, warn};

/// Installs a plain terminal logger.
///
/// Library code only emits through the `log` facade; binaries and tests that
/// want output call this once. Repeated calls are a no-op.
pub fn init() {
    let _ = simple_logger::SimpleLogger::new().init();
}
