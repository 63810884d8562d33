// demos/convert_dataset.rs
use neurolab_converter::{convert, ConversionConfig, JsonContainerWriter};
use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage: {} <dataset_dir> <output_dir> [config.json]",
            args[0]
        );
        std::process::exit(1);
    }

    let config = match args.get(3) {
        Some(path) => ConversionConfig::from_json_file(path)?,
        None => ConversionConfig::default(),
    };

    let mut paths = Vec::new();
    collect_files(Path::new(&args[1]), &mut paths)?;
    paths.retain(|p| {
        p.extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_uppercase().as_str(), "CEL" | "RMA"))
            .unwrap_or(false)
    });
    paths.sort();
    println!("Found {} CEL/RMA files under {}", paths.len(), args[1]);

    let tic = Instant::now();
    let writer = JsonContainerWriter::new(&args[2]);
    let summary = convert(&paths, &config, &writer);

    println!("\n{}", summary);
    println!(
        "{} of {} sessions written in {:.1} s",
        summary.num_written(),
        summary.sessions.len(),
        tic.elapsed().as_secs_f64()
    );
    Ok(())
}
