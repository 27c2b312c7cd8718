use std::path::PathBuf;

use crate::cli::BuildArgs;
use crate::render::RenderOptions;

pub fn run(args: BuildArgs) -> anyhow::Result<()> {
    let json_path = args
        .json
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| crate::scrape::default_output_path(&args.user_id));
    let output = args
        .output
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| crate::render::default_output_path(&json_path));

    tracing::info!(user = %args.user_id, json = %json_path.display(), "build: scrape");
    let books = crate::scrape::scrape_books(
        &args.user_id,
        args.max_pages.map(|n| n as usize),
        &args.base_url,
    )?;
    crate::formats::save_books(&json_path, &books)?;
    println!("Saved {} books to {}", books.len(), json_path.display());

    tracing::info!(output = %output.display(), "build: render");
    let options = RenderOptions::from_args(output, &args.layout, &args.palette, &args.fetch);
    crate::render::render_collection(books, &options)
}
