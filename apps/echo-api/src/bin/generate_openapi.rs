use utoipa::OpenApi;

fn main() -> std::io::Result<()> {
    let spec = echo_api::routes::ApiDoc::openapi()
        .to_pretty_json()
        .map_err(std::io::Error::other)?;
    let out = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs/echo-api.json");
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&out, spec)?;
    println!("Wrote {}", out.display());
    Ok(())
}
