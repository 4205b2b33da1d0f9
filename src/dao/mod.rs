/// Static JSON fixture loading.
pub mod fixtures;
/// Fixture file model definitions.
pub mod models;
