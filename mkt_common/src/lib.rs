mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{MinorUnits, MoneyConversionError};
pub use secret::Secret;
