use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;

use design_fidelity::{
    Bounds, Classification, DiffOptions, FileDesignSource, PageImageDriver, RasterImage,
    RunConfig, SectionRunner, SectionSpec, Thresholds, classify, diff_with_options,
    normalize_pair,
};

/// Design Fidelity - visual comparison of implementations against design references
#[derive(Parser, Debug)]
#[command(
    name = "design-fidelity",
    about = "Region-by-region visual fidelity checking for CI",
    after_help = "ENVIRONMENT VARIABLES:\n\
        DESIGN_FIDELITY_THRESHOLD_PASS        Max diff ratio for PASS\n\
        DESIGN_FIDELITY_THRESHOLD_WARN        Max diff ratio for WARNING\n\
        DESIGN_FIDELITY_PERCEPTUAL_THRESHOLD  Per-pixel color tolerance\n\
        DESIGN_FIDELITY_FILL_COLOR            Padding fill color (hex)\n\
        DESIGN_FIDELITY_MAX_CONCURRENCY       Worker threads per run\n\
        DESIGN_FIDELITY_TIMEOUT_MS            Per-operation timeout (ms)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare two images and classify the difference
    Compare {
        /// Path to the design reference image
        #[arg(short, long)]
        design: PathBuf,

        /// Path to the implementation capture
        #[arg(short, long)]
        implementation: PathBuf,

        /// Write the visual diff raster to this path
        #[arg(long)]
        diff_output: Option<PathBuf>,

        /// Per-pixel color-distance tolerance
        #[arg(long, env = "DESIGN_FIDELITY_PERCEPTUAL_THRESHOLD", default_value = "0.1")]
        perceptual_threshold: f64,

        /// Max diff ratio classified as PASS
        #[arg(long, env = "DESIGN_FIDELITY_THRESHOLD_PASS", default_value = "0.08")]
        pass_threshold: f64,

        /// Max diff ratio classified as WARNING
        #[arg(long, env = "DESIGN_FIDELITY_THRESHOLD_WARN", default_value = "0.15")]
        warn_threshold: f64,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a full multi-region fidelity check
    Run {
        /// URL of the implementation under test
        #[arg(short, long)]
        url: String,

        /// JSON manifest: array of sections with name, bounds, optional
        /// selector, and the design reference
        #[arg(short, long)]
        sections: PathBuf,

        /// Root directory of design exports (<file_key>/<node_id>.png)
        #[arg(short, long)]
        design_dir: PathBuf,

        /// Pre-rendered full-page screenshot of the implementation
        #[arg(short, long)]
        page: PathBuf,

        /// Optional JSON map of CSS selector to element bounds
        #[arg(long)]
        selectors: Option<PathBuf>,

        /// Output the run record as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Some(Commands::Compare {
            design,
            implementation,
            diff_output,
            perceptual_threshold,
            pass_threshold,
            warn_threshold,
            json,
        }) => {
            let design_img = RasterImage::from_png_bytes(&std::fs::read(&design)?)?;
            let impl_img = RasterImage::from_png_bytes(&std::fs::read(&implementation)?)?;

            let config = RunConfig::from_env();
            let (design_img, impl_img) =
                normalize_pair(&design_img, &impl_img, config.fill_color);
            let result = diff_with_options(
                &design_img,
                &impl_img,
                &DiffOptions::new(perceptual_threshold).highlight_color(config.highlight_color),
            )?;
            let classification = classify(
                result.diff_ratio,
                &Thresholds::new(pass_threshold, warn_threshold),
            );

            if let Some(path) = diff_output {
                std::fs::write(&path, result.diff_image.to_png()?)?;
            }

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "diff_pixel_count": result.diff_pixel_count,
                        "total_pixels": result.total_pixels,
                        "diff_ratio": result.diff_ratio,
                        "classification": classification,
                    }))?
                );
            } else {
                println!("Compared {} vs {}", design.display(), implementation.display());
                println!(
                    "  {} of {} pixels differ (ratio {:.4})",
                    result.diff_pixel_count, result.total_pixels, result.diff_ratio
                );
                println!("  Classification: {}", classification);
            }

            if classification == Classification::Fail {
                std::process::exit(1);
            }
        }

        Some(Commands::Run {
            url,
            sections,
            design_dir,
            page,
            selectors,
            json,
        }) => {
            let manifest = std::fs::read_to_string(&sections)?;
            let specs: Vec<SectionSpec> = serde_json::from_str(&manifest)?;

            let mut driver = PageImageDriver::from_file(&page)?;
            if let Some(path) = selectors {
                let map: HashMap<String, Bounds> =
                    serde_json::from_str(&std::fs::read_to_string(&path)?)?;
                for (selector, bounds) in map {
                    driver = driver.with_selector(selector, bounds);
                }
            }

            let runner = SectionRunner::new(
                RunConfig::from_env(),
                Box::new(FileDesignSource::new(&design_dir)),
                Box::new(driver),
            );
            let result = runner.run(&url, &specs)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Run completed: {} sections", result.sections.len());
                for section in &result.sections {
                    match (&section.classification, &section.error) {
                        (Some(classification), _) => {
                            let ratio = section
                                .diff
                                .as_ref()
                                .map(|d| format!("{:.4}", d.diff_ratio))
                                .unwrap_or_default();
                            println!(
                                "  {:10} {}  (ratio {})",
                                classification.to_string(),
                                section.region.name,
                                ratio
                            );
                        }
                        (None, Some(error)) => {
                            println!("  {:10} {}  ({})", "FAILED", section.region.name, error);
                        }
                        (None, None) => {}
                    }
                }
                println!("Overall: {}", result.overall_status);
            }

            if result.overall_status == Classification::Fail {
                std::process::exit(1);
            }
        }

        None => {
            println!("Design Fidelity - visual comparison for CI");
            println!();
            println!("Usage: design-fidelity <COMMAND>");
            println!();
            println!("Commands:");
            println!("  compare  Compare two images and classify the difference");
            println!("  run      Run a full multi-region fidelity check");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}
