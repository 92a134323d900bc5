pub mod diff;
pub mod favorites;
pub mod functions;
pub mod history;
pub mod models;
pub mod schema;
pub mod store;
