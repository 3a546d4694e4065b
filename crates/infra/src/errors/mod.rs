//! Error conversion layer between external crates and the domain

mod conversions;

pub use conversions::InfraError;
