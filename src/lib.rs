pub mod config;
pub mod fetch;
pub mod geocode;
pub mod output;
pub mod pipeline;
pub mod process;
