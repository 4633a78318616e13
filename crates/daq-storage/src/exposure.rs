//! Exposure metadata cards for PIXIS frames.
//!
//! Acquisition scripts pass the camera settings as strings and leave a small
//! telemetry file next to the raw dump: CCD temperature on the first line,
//! then the start and end of the exposure as Unix seconds.

use crate::error::StorageError;
use crate::header::FitsHeader;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Value written to `INSTRUME`.
pub const INSTRUMENT: &str = "OSELOTS";

/// UTC timestamp format of `STARTEXP`/`ENDEXP`.
pub const UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Classification written to `OBSTYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObsType {
    /// Exposure under 1 ms
    Bias,
    /// Shutter kept closed
    Dark,
    /// Regular exposure
    Normal,
}

impl ObsType {
    /// Header value.
    pub fn as_str(self) -> &'static str {
        match self {
            ObsType::Bias => "BIAS",
            ObsType::Dark => "DARK",
            ObsType::Normal => "NORMAL",
        }
    }
}

/// Detector gain in e-/ADU for a PIXIS gain setting.
pub fn gain_for_key(key: i64) -> Result<i64, StorageError> {
    match key {
        0 => Ok(4),
        1 => Ok(2),
        2 => Ok(1),
        _ => Err(StorageError::UnknownKey { field: "gain", key }),
    }
}

/// Readout speed in MHz.
pub fn readout_speed_for_key(key: i64) -> Result<f64, StorageError> {
    match key {
        0 => Ok(1.0),
        1 => Ok(0.2),
        _ => Err(StorageError::UnknownKey {
            field: "readout speed",
            key,
        }),
    }
}

/// Typical RMS read noise in electrons at a readout speed.
pub fn read_noise_for_key(key: i64) -> Result<f64, StorageError> {
    match key {
        0 => Ok(3.0),
        1 => Ok(9.0),
        _ => Err(StorageError::UnknownKey {
            field: "readout speed",
            key,
        }),
    }
}

/// Camera settings of one exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureSettings {
    /// Object observed
    pub target_name: String,
    /// Exposure time in milliseconds
    pub exposure_ms: f64,
    /// 1 when the shutter stayed closed
    pub shutter_key: i64,
    /// PIXIS gain setting (0, 1 or 2)
    pub gain_key: i64,
    /// PIXIS readout speed setting (0 or 1)
    pub readout_speed_key: i64,
    /// Collimating lens position in mm
    pub focus_position_mm: f64,
    /// Local start time as recorded by the acquisition script
    pub local_start: String,
    /// Local end time as recorded by the acquisition script
    pub local_end: String,
}

impl ExposureSettings {
    /// Parse settings from the strings an acquisition script passes along.
    #[allow(clippy::too_many_arguments)]
    pub fn parse(
        target_name: &str,
        exposure_ms: &str,
        shutter_key: &str,
        gain_key: &str,
        readout_speed_key: &str,
        focus_position_mm: &str,
        local_start: &str,
        local_end: &str,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            target_name: target_name.trim().to_string(),
            exposure_ms: parse_finite("exposure time", exposure_ms)?,
            shutter_key: parse_field("shutter key", shutter_key)?,
            gain_key: parse_field("gain key", gain_key)?,
            readout_speed_key: parse_field("readout speed key", readout_speed_key)?,
            focus_position_mm: parse_finite("focus position", focus_position_mm)?,
            local_start: local_start.trim().to_string(),
            local_end: local_end.trim().to_string(),
        })
    }

    /// OBSTYPE classification.
    pub fn obs_type(&self) -> ObsType {
        if self.exposure_ms < 1.0 {
            ObsType::Bias
        } else if self.shutter_key == 1 {
            ObsType::Dark
        } else {
            ObsType::Normal
        }
    }

    /// Exposure cards followed by whatever `telemetry` recorded.
    ///
    /// # Errors
    ///
    /// Unknown gain or readout speed keys.
    pub fn header(&self, telemetry: &Telemetry) -> Result<FitsHeader, StorageError> {
        let mut header = FitsHeader::new();
        header.set("TARGET", self.target_name.as_str(), "target of exposure")?;
        header.set("EXPTIME", self.exposure_ms / 1000.0, "[s] exposure time")?;
        header.set("INSTRUME", INSTRUMENT, "Instrument in use")?;
        header.set(
            "OBSTYPE",
            self.obs_type().as_str(),
            "Type of exposure (BIAS, DARK, or NORMAL)",
        )?;
        header.set(
            "GAIN",
            gain_for_key(self.gain_key)?,
            "[e-/ADU] PIXIS detector gain",
        )?;
        header.set(
            "RDSPEED",
            readout_speed_for_key(self.readout_speed_key)?,
            "[MHz] PIXIS readout speed setting",
        )?;
        header.set(
            "RDNOISE",
            read_noise_for_key(self.readout_speed_key)?,
            "[e-] PIXIS typical rms readnoise",
        )?;
        header.set(
            "FOCUSPOS",
            self.focus_position_mm,
            "Position of collimating lens (mm)",
        )?;
        header.set(
            "LOCSTART",
            self.local_start.as_str(),
            "Start of exposure, in local (computer) time",
        )?;
        header.set(
            "LOCEND",
            self.local_end.as_str(),
            "End of exposure, in local (computer) time",
        )?;
        telemetry.append_to(&mut header)?;
        Ok(header)
    }
}

fn parse_field<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, StorageError> {
    raw.trim().parse().map_err(|_| StorageError::InvalidSetting {
        field,
        value: raw.to_string(),
    })
}

/// Values recorded by the acquisition script during an exposure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    /// CCD temperature in degrees C
    pub temperature_c: Option<i64>,
    /// Start of acquisition
    pub start: Option<DateTime<Utc>>,
    /// End of acquisition
    pub end: Option<DateTime<Utc>>,
}

impl Telemetry {
    /// Read a telemetry file.
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read exposure parameters {:?}", path))?;
        Self::parse(&text).with_context(|| format!("Bad exposure parameters in {:?}", path))
    }

    /// Parse temperature, start and end, one per line. Blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, StorageError> {
        let mut telemetry = Self::default();
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        if let Some(line) = lines.next() {
            let celsius = parse_finite("temperature", line)?;
            telemetry.temperature_c = Some(celsius.round() as i64);
        }
        if let Some(line) = lines.next() {
            telemetry.start = Some(parse_unix_seconds("exposure start", line)?);
        }
        if let Some(line) = lines.next() {
            telemetry.end = Some(parse_unix_seconds("exposure end", line)?);
        }

        let extra = lines.count();
        if extra > 0 {
            tracing::warn!(extra, "Ignoring extra lines in exposure parameter file");
        }
        Ok(telemetry)
    }

    fn append_to(&self, header: &mut FitsHeader) -> Result<(), StorageError> {
        if let Some(temp) = self.temperature_c {
            header.set("TEMP", temp, "temperature of PIXIS CCD")?;
        }
        if let Some(start) = self.start {
            header.set(
                "STARTEXP",
                start.format(UTC_FORMAT).to_string(),
                "start of acquisition (GMT)",
            )?;
        }
        if let Some(end) = self.end {
            header.set(
                "ENDEXP",
                end.format(UTC_FORMAT).to_string(),
                "end of acquisition (GMT)",
            )?;
        }
        Ok(())
    }
}

/// `f64` that is neither NaN nor infinite.
fn parse_finite(field: &'static str, raw: &str) -> Result<f64, StorageError> {
    let value: f64 = parse_field(field, raw)?;
    if !value.is_finite() {
        return Err(StorageError::InvalidSetting {
            field,
            value: raw.to_string(),
        });
    }
    Ok(value)
}

fn parse_unix_seconds(field: &'static str, raw: &str) -> Result<DateTime<Utc>, StorageError> {
    let seconds = parse_finite(field, raw)?;
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999)).ok_or_else(|| {
        StorageError::InvalidSetting {
            field,
            value: raw.to_string(),
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::header::HeaderValue;

    fn settings(exp: &str, shutter: &str) -> ExposureSettings {
        ExposureSettings::parse(
            "HD 12345", exp, shutter, "1", "0", " 12.5 ", "10:00:00", "10:00:05",
        )
        .unwrap()
    }

    #[test]
    fn obs_type_rules() {
        assert_eq!(settings("0", "1").obs_type(), ObsType::Bias);
        assert_eq!(settings("0.5", "0").obs_type(), ObsType::Bias);
        assert_eq!(settings("1000", "1").obs_type(), ObsType::Dark);
        assert_eq!(settings("1000", "0").obs_type(), ObsType::Normal);
    }

    #[test]
    fn header_cards_in_order() {
        let telemetry = Telemetry::parse("-70\n1700000000\n1700000005.5\n").unwrap();
        let header = settings("2500", "0").header(&telemetry).unwrap();

        let keys: Vec<&str> = header.cards().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "TARGET", "EXPTIME", "INSTRUME", "OBSTYPE", "GAIN", "RDSPEED", "RDNOISE",
                "FOCUSPOS", "LOCSTART", "LOCEND", "TEMP", "STARTEXP", "ENDEXP"
            ]
        );
        assert_eq!(header.get("EXPTIME").unwrap().value, HeaderValue::Float(2.5));
        assert_eq!(header.get("GAIN").unwrap().value, HeaderValue::Int(2));
        assert_eq!(header.get("RDSPEED").unwrap().value, HeaderValue::Float(1.0));
        assert_eq!(header.get("RDNOISE").unwrap().value, HeaderValue::Float(3.0));
        assert_eq!(header.get("FOCUSPOS").unwrap().value, HeaderValue::Float(12.5));
        assert_eq!(header.get("TEMP").unwrap().value, HeaderValue::Int(-70));
        assert_eq!(
            header.get("STARTEXP").unwrap().value,
            HeaderValue::from("2023-11-14T22:13:20Z")
        );
        assert_eq!(
            header.get("ENDEXP").unwrap().value,
            HeaderValue::from("2023-11-14T22:13:25Z")
        );
    }

    #[test]
    fn slow_readout_mapping() {
        let mut s = settings("10", "0");
        s.readout_speed_key = 1;
        s.gain_key = 2;
        let header = s.header(&Telemetry::default()).unwrap();
        assert_eq!(header.get("RDSPEED").unwrap().value, HeaderValue::Float(0.2));
        assert_eq!(header.get("RDNOISE").unwrap().value, HeaderValue::Float(9.0));
        assert_eq!(header.get("GAIN").unwrap().value, HeaderValue::Int(1));
        assert!(header.get("TEMP").is_none());
    }

    #[test]
    fn unknown_keys_are_errors() {
        let mut s = settings("10", "0");
        s.gain_key = 3;
        assert!(matches!(
            s.header(&Telemetry::default()),
            Err(StorageError::UnknownKey { field: "gain", key: 3 })
        ));
        s.gain_key = 0;
        s.readout_speed_key = 2;
        assert!(s.header(&Telemetry::default()).is_err());
    }

    #[test]
    fn bad_numbers_name_the_field() {
        let err = ExposureSettings::parse("x", "fast", "0", "0", "0", "0", "", "").unwrap_err();
        assert_eq!(err.to_string(), "invalid exposure time: \"fast\"");
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert!(matches!(
            Telemetry::parse("nan\n"),
            Err(StorageError::InvalidSetting { field: "temperature", .. })
        ));
        assert!(matches!(
            Telemetry::parse("-70\nNaN\n1\n"),
            Err(StorageError::InvalidSetting { field: "exposure start", .. })
        ));
        assert!(matches!(
            Telemetry::parse("-70\n0\ninf\n"),
            Err(StorageError::InvalidSetting { field: "exposure end", .. })
        ));

        let err = ExposureSettings::parse("x", "nan", "0", "0", "0", "0", "", "").unwrap_err();
        assert_eq!(err.to_string(), "invalid exposure time: \"nan\"");
        assert!(ExposureSettings::parse("x", "10", "0", "0", "0", "-inf", "", "").is_err());
    }

    #[test]
    fn telemetry_partial_and_rounded() {
        let t = Telemetry::parse("-69.6\n").unwrap();
        assert_eq!(t.temperature_c, Some(-70));
        assert_eq!(t.start, None);

        let t = Telemetry::parse("-70\n0\n1\nextra\n").unwrap();
        assert_eq!(t.end.unwrap().format(UTC_FORMAT).to_string(), "1970-01-01T00:00:01Z");

        assert!(Telemetry::parse("warm\n").is_err());
    }
}
