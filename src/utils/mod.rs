pub mod cancel;
pub mod constants;
pub mod progress;

pub use cancel::CancelFlag;
pub use constants::*;
pub use progress::ProgressReporter;
