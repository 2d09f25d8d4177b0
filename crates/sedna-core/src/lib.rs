pub mod api;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod error;
pub mod generation;
pub mod history;
pub mod mood;
pub mod platform;
pub mod player;
pub mod protocol;
pub mod selector;
pub mod session;
pub mod state;
pub mod store;

pub use error::{Result, SednaError};
