pub mod adb;
pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod models;
pub mod operator;
pub mod permissions;
pub mod runtime;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
