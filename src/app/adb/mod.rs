pub mod apps;
pub mod args;
pub mod dispatcher;
pub mod host;
pub mod locator;
pub mod parse;
pub mod runner;
