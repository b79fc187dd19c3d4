//! `inspect` command: header and validation verdict for one file

use super::{CliError, OutputFormat};
use crate::pipeline::{HeaderParser, Jp2HeaderParser, ValidationRules};
use crate::pipeline::rules::DEFAULT_MIN_PERCENTD;
use crate::{BadImageReason, ImageMetadata};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

/// Arguments for `inspect`
#[derive(Parser, Debug)]
pub struct InspectCommand {
    /// JPEG 2000 file to inspect
    pub file: PathBuf,

    /// AIA completeness threshold
    #[arg(long, default_value_t = DEFAULT_MIN_PERCENTD)]
    pub min_percentd: f64,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Print every header keyword
    #[arg(long, default_value_t = false)]
    pub header: bool,
}

/// Result of inspecting one file
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    /// Parsed metadata
    pub image: ImageMetadata,
    /// Rejection code, if the file would be quarantined
    pub rejection: Option<&'static str>,
}

impl InspectCommand {
    /// Parse and validate the file
    pub fn inspect(&self) -> Result<Inspection, CliError> {
        let image = Jp2HeaderParser.parse(&self.file)?;
        let rules = ValidationRules {
            min_percentd: self.min_percentd,
        };
        let rejection = match image.validate() {
            Err(_) => Some(BadImageReason::Header.code()),
            Ok(()) => rules.check(&image).err().map(|reason| reason.code()),
        };
        Ok(Inspection { image, rejection })
    }

    /// Execute the inspect command
    pub async fn execute(&self) -> Result<(), CliError> {
        let Inspection { image, rejection } = self.inspect()?;

        match self.format {
            OutputFormat::Json => {
                let mut value = json!({
                    "filename": image.filename(),
                    "observatory": image.observatory,
                    "instrument": image.instrument,
                    "detector": image.detector,
                    "measurement": image.measurement,
                    "date": image.date.format(crate::DATE_FORMAT).to_string(),
                    "nickname": image.nickname(),
                    "valid": rejection.is_none(),
                    "reason": rejection,
                });
                if self.header {
                    value["header"] = json!(image.header);
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value)
                        .map_err(|e| CliError::InvalidArgument(e.to_string()))?
                );
            }
            OutputFormat::Human => {
                println!("File:        {}", self.file.display());
                println!("Observatory: {}", image.observatory);
                println!("Instrument:  {}", image.instrument);
                println!("Detector:    {}", image.detector);
                println!("Measurement: {}", image.measurement);
                println!("Date:        {}", image.date.format(crate::DATE_FORMAT));
                match rejection {
                    None => println!("Verdict:     valid"),
                    Some(code) => println!("Verdict:     quarantine ({code})"),
                }
                if self.header {
                    println!();
                    for (key, value) in &image.header {
                        println!("  {key} = {value}");
                    }
                }
            }
        }

        Ok(())
    }
}
