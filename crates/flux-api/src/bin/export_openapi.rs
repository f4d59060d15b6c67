//! Emits the OpenAPI document without starting the HTTP server.
//!
//! Usage: `cargo run --bin export_openapi > openapi.json`

use flux_api::openapi::ApiDoc;
use utoipa::OpenApi;

fn main() {
    println!("{}", ApiDoc::openapi().to_pretty_json().expect("OpenAPI document serializes"));
}
