//! The flux HTTP surface: one module per resource plus the shared
//! config/state/OpenAPI wiring consumed by `main` and `bin/export_openapi`.

pub mod api;
pub mod clients;
pub mod config;
pub mod openapi;
