//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document of the attendance REST API to disk, by default
//! `openapi.json`, or to the path given as the first argument.

use attendance_api::web::rest::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());

    let api_doc = ApiDoc::openapi();
    let route_count = api_doc.paths.paths.len();
    std::fs::write(&path, api_doc.to_pretty_json()?)?;
    println!("OpenAPI document with {} paths written to {}", route_count, path);
    Ok(())
}
