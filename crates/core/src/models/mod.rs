pub mod coin;
pub mod holding;
pub mod portfolio;
pub mod price;
pub mod settings;
pub mod transaction;
