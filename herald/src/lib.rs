//! Herald: a resilient message dispatcher
//!
//! Ties the delivery engine to a configuration file and a set of mock
//! providers. See [`herald_delivery`] for the engine itself.

pub mod controller;

pub use controller::Herald;
