mod bail;
mod error;
mod mix;
mod shutdown;

pub mod prelude {
    pub use crate::bail::VirtualUserBailError;
    pub use crate::error::ConfigurationError;
    pub use crate::mix::{MixEntry, WeightedMix, WeightedMixBuilder, WEIGHT_TOLERANCE};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
