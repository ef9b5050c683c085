pub mod hardware_key;

pub use hardware_key::HardwareKey;
