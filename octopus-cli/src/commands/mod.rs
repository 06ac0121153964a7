//! CLI command implementations

pub mod pr;
pub mod run;
pub mod secrets;

pub use pr::PrArgs;
pub use run::RunArgs;
pub use secrets::SecretsArgs;
