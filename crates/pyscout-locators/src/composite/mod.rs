//! Composition of locators: fan-in over many children and an on/off gate
//! around one.

mod disableable;
mod locators;
mod relay;

pub use disableable::DisableableLocator;
pub use locators::Locators;
pub use relay::ChangeRelay;
