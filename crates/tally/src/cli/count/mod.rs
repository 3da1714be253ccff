//! The `tally count` command.

mod setup;
pub mod types;

pub use types::{DeviceArg, OutputFormat};

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tally_core::{get_device, Config, ExemplarBox, ReportWriter, Tally};

pub use setup::load_config;

use setup::prompt_set;
use types::parse_exemplar;

/// Arguments for the `count` command.
#[derive(Args, Debug)]
pub struct CountArgs {
    /// Image to count objects in
    #[arg(required = true)]
    pub image: PathBuf,

    /// Text description of the objects to count
    #[arg(short, long, default_value = "")]
    pub text: String,

    /// Exemplar box `x1,y1,x2,y2` in exemplar-image pixels (repeatable)
    #[arg(short, long, value_parser = parse_exemplar, value_name = "X1,Y1,X2,Y2")]
    pub exemplar: Vec<ExemplarBox>,

    /// JSON file of prompts, each `[x1, y1, flag1, x2, y2, flag2]`
    #[arg(long)]
    pub prompts: Option<PathBuf>,

    /// Image the exemplars are drawn on (defaults to the counted image)
    #[arg(long)]
    pub exemplar_image: Option<PathBuf>,

    /// Comma-separated words of the text to restrict matching to
    #[arg(short, long, default_value = "")]
    pub keywords: String,

    /// Write a PNG density heatmap to this path
    #[arg(long)]
    pub heatmap: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Execution device
    #[arg(long, value_enum, default_value = "auto")]
    pub device: DeviceArg,

    /// Checkpoint to load instead of the configured one
    #[arg(long)]
    pub pretrain_model_path: Option<PathBuf>,

    /// Threads for the inference runtime
    #[arg(long, default_value = "8")]
    pub num_workers: usize,

    /// Config overrides as `section.key=value`
    #[arg(long, num_args = 1.., value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Evaluation mode (counting always runs inference only)
    #[arg(long)]
    pub eval: bool,

    /// Test mode (counting always runs inference only)
    #[arg(long)]
    pub test: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Request mixed precision (decided by the exported checkpoint)
    #[arg(long)]
    pub amp: bool,

    /// Save the report next to the image when no --output is given
    #[arg(long)]
    pub save_results: bool,

    /// Free-form note stored in the report
    #[arg(long)]
    pub note: Option<String>,
}

/// Execute the count command with a config already carrying `--options`.
pub fn execute(args: CountArgs, config: Config) -> anyhow::Result<()> {
    if !args.image.exists() {
        anyhow::bail!(
            "Image does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            args.image
        );
    }

    let device = args.device.resolve(get_device() == tally_core::Device::Cuda);
    if args.amp {
        tracing::debug!("--amp has no effect; precision is fixed by the checkpoint");
    }
    if args.eval || args.test {
        tracing::debug!("Running in inference mode");
    }

    let image = image::open(&args.image)
        .with_context(|| format!("Failed to open image {}", args.image.display()))?;
    let prompts = prompt_set(&args, &image)?;

    let mut tally = Tally::build(config, device, args.num_workers)?;
    tracing::info!("Model loaded on {}", tally.device());

    let detections = tally.detect(&image, &args.text, prompts.as_ref(), &args.keywords)?;
    let mut report = tally.report(
        Some(args.image.as_path()),
        &args.text,
        prompts.as_ref(),
        &detections,
    );
    report.note = args.note.clone();
    tracing::info!("{} Count: {}", report.label, report.count);

    if let Some(ref path) = args.heatmap {
        let png = tally.heatmap(&image, &detections)?;
        std::fs::write(path, png)
            .with_context(|| format!("Failed to write heatmap {}", path.display()))?;
        tracing::info!("Heatmap written to {:?}", path);
    }

    let destination = args.output.clone().or_else(|| {
        args.save_results
            .then(|| args.image.with_extension(report_extension(args.format)))
    });

    let pretty = tally.config().report.pretty;
    match destination {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            let mut writer = ReportWriter::new(BufWriter::new(file), args.format.into(), pretty);
            writer.write(&report)?;
            writer.flush()?;
            tracing::info!("Report written to {:?}", path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = ReportWriter::new(stdout.lock(), args.format.into(), pretty);
            writer.write(&report)?;
            writer.flush()?;
        }
    }

    Ok(())
}

fn report_extension(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Json => "count.json",
        OutputFormat::Jsonl => "count.jsonl",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        count: CountArgs,
    }

    fn parse(args: &[&str]) -> Result<CountArgs, clap::Error> {
        TestCli::try_parse_from(std::iter::once("count").chain(args.iter().copied()))
            .map(|cli| cli.count)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["apples.jpg"]).unwrap();
        assert_eq!(args.text, "");
        assert_eq!(args.keywords, "");
        assert_eq!(args.num_workers, 8);
        assert_eq!(args.device, DeviceArg::Auto);
        assert!(args.exemplar.is_empty());
        assert!(args.options.is_empty());
    }

    #[test]
    fn test_repeated_exemplars() {
        let args = parse(&[
            "apples.jpg",
            "--exemplar",
            "1,2,3,4",
            "-e",
            "5,6,7,8",
            "--text",
            "apple",
        ])
        .unwrap();
        assert_eq!(args.exemplar.len(), 2);
        assert_eq!(args.exemplar[1], ExemplarBox { x1: 5.0, y1: 6.0, x2: 7.0, y2: 8.0 });
    }

    #[test]
    fn test_bad_exemplar_rejected() {
        assert!(parse(&["apples.jpg", "--exemplar", "1,2"]).is_err());
    }

    #[test]
    fn test_image_required() {
        assert!(parse(&["--text", "apple"]).is_err());
    }

    #[test]
    fn test_legacy_flags_accepted() {
        let args = parse(&["apples.jpg", "--eval", "--amp", "--debug", "--device", "cpu"]).unwrap();
        assert!(args.eval && args.amp && args.debug);
        assert_eq!(args.device, DeviceArg::Cpu);
    }

    #[test]
    fn test_report_extension() {
        assert_eq!(
            Path::new("shots/apples.jpg").with_extension(report_extension(OutputFormat::Json)),
            Path::new("shots/apples.count.json")
        );
    }

    #[test]
    fn test_missing_image_fails_early() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.jpg");
        let args = parse(&[missing.to_str().unwrap()]).unwrap();
        let err = execute(args, Config::default()).unwrap_err();
        assert!(err.to_string().contains("Image does not exist"));
    }
}
