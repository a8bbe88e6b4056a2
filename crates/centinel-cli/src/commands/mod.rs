pub mod reload;
pub mod run;
pub mod stats;
pub mod validate;
