//! `oselots pixis-to-fits ...`

use anyhow::{Context, Result};
use clap::Args;
use daq_core::config::LabConfig;
use daq_storage::{
    convert_raw_to_fits, ByteOrder, ConvertRequest, ExposureSettings, RawFrameLayout, Telemetry,
};
use std::path::Path;

#[derive(Args)]
pub struct PixisArgs {
    /// Raw dump, relative to `source_dir`
    source_file: String,
    /// Output name without suffix
    target_file: String,
    /// Telemetry file (temperature, start, end), relative to `source_dir`
    exposure_parameter_file: String,
    /// Directory holding the dump; may be empty
    source_dir: String,
    /// Output directory; empty uses `storage.output_dir`
    target_dir: String,
    target_name: String,
    /// Exposure time in ms
    exp_time: String,
    /// 1 when the shutter stayed closed
    shutter_key: String,
    /// 0, 1 or 2
    gain_key: String,
    /// 0 (1 MHz) or 1 (200 kHz)
    exp_speed_key: String,
    /// Collimator position in mm
    #[arg(allow_negative_numbers = true)]
    focus_pos: String,
    local_start: String,
    local_end: String,

    /// Samples are big-endian
    #[arg(long)]
    big_endian: bool,

    /// Frames in the dump
    #[arg(long, default_value_t = 1)]
    frames: usize,

    #[arg(long, default_value_t = 1024)]
    width: usize,

    #[arg(long, default_value_t = 1024)]
    height: usize,

    /// Fail instead of replacing existing files
    #[arg(long)]
    no_overwrite: bool,
}

impl PixisArgs {
    fn request(&self, config: &LabConfig) -> Result<ConvertRequest> {
        let settings = ExposureSettings::parse(
            &self.target_name,
            &self.exp_time,
            &self.shutter_key,
            &self.gain_key,
            &self.exp_speed_key,
            &self.focus_pos,
            &self.local_start,
            &self.local_end,
        )?;
        let source_dir = Path::new(&self.source_dir);
        let telemetry = Telemetry::read(source_dir.join(&self.exposure_parameter_file))?;

        let target_dir: &Path = if self.target_dir.is_empty() {
            &config.storage.output_dir
        } else {
            Path::new(&self.target_dir)
        };

        let mut request = ConvertRequest::new(
            source_dir.join(&self.source_file),
            target_dir,
            self.target_file.as_str(),
            &config.storage,
        );
        request.layout = RawFrameLayout {
            width: self.width,
            height: self.height,
            byte_order: if self.big_endian {
                ByteOrder::Big
            } else {
                ByteOrder::Little
            },
            ..RawFrameLayout::default()
        };
        request.frames = self.frames;
        request.overwrite = config.storage.overwrite && !self.no_overwrite;
        request.header = settings.header(&telemetry)?;
        Ok(request)
    }
}

pub async fn run(args: PixisArgs, config: &LabConfig) -> Result<()> {
    let request = args.request(config)?;
    let source = request.source.clone();

    let written = tokio::task::spawn_blocking(move || convert_raw_to_fits(&request))
        .await
        .context("Conversion task panicked")??;

    println!("Converted {}", source.display());
    for path in written {
        println!("  {}", path.display());
    }
    Ok(())
}
