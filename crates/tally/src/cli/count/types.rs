//! CLI value types for the count command: output format, device, exemplar boxes.

use clap::ValueEnum;
use tally_core::{Device, ExemplarBox, OutputFormat as CoreOutputFormat};

/// Supported output formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// One JSON document
    Json,
    /// One JSON object per line, for appending runs
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::Jsonl,
        }
    }
}

/// Execution device choice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DeviceArg {
    /// CUDA when available, otherwise CPU
    #[default]
    Auto,
    /// Always run on CPU
    Cpu,
    /// Run on CUDA, falling back to CPU if unavailable
    Cuda,
}

impl DeviceArg {
    /// Resolve to a concrete device given CUDA availability.
    pub fn resolve(self, cuda_available: bool) -> Device {
        match self {
            DeviceArg::Cpu => Device::Cpu,
            DeviceArg::Auto if cuda_available => Device::Cuda,
            DeviceArg::Auto => Device::Cpu,
            DeviceArg::Cuda if cuda_available => Device::Cuda,
            DeviceArg::Cuda => {
                tracing::warn!("CUDA requested but not available, falling back to CPU");
                Device::Cpu
            }
        }
    }
}

/// Parse `x1,y1,x2,y2` into an exemplar box.
pub fn parse_exemplar(s: &str) -> Result<ExemplarBox, String> {
    let coords = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|e| format!("invalid coordinate {v:?}: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match coords.as_slice() {
        &[x1, y1, x2, y2] => Ok(ExemplarBox { x1, y1, x2, y2 }),
        _ => Err(format!(
            "expected four comma-separated numbers x1,y1,x2,y2, got {}",
            coords.len()
        )),
    }
}
