//! Thin entry point: load the config, run the localization pipeline over
//! the import document, write the rewritten document back out.

mod logging;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use blogport_core::{Document, RunConfig};
use blogport_engine::RunController;
use port_logging::port_info;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (input, output, config_path) = match args.as_slice() {
        [input, output] => (input, output, None),
        [input, output, config] => (input, output, Some(config)),
        _ => bail!("usage: blogport <input.json> <output.json> [config.ron]"),
    };

    let config = load_config(config_path.map(Path::new))?;
    logging::initialize(config.verbose);

    let raw = fs::read_to_string(input)
        .with_context(|| format!("reading import document {input}"))?;
    let mut document: Document =
        serde_json::from_str(&raw).with_context(|| format!("parsing import document {input}"))?;

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let controller = RunController::new(config);
    let stats = runtime
        .block_on(controller.run(&mut document))
        .context("image localization failed")?;

    let rendered =
        serde_json::to_string_pretty(&document).context("serializing output document")?;
    fs::write(output, rendered).with_context(|| format!("writing output document {output}"))?;

    port_info!(
        "done: {} post(s) processed, {} gated; images: {} fetched, {} refetched, {} verified, {} trusted",
        stats.posts_processed,
        stats.posts_gated,
        stats.images_fetched,
        stats.images_refetched,
        stats.images_verified,
        stats.images_trusted,
    );
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    ron::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}
