pub mod bulk;
pub mod catalog;
pub mod reconcile;
