//! Extended filenames: `path?&key=value&key=value`.
//!
//! Recognized keys are `streaming:type`, `streaming:sizemode`,
//! `streaming:sizevalue`, `streaming:ram`, `streaming:bias`, `box=x:y:w:h`
//! and `bands=1,3:4` (1-based, inclusive ranges).

use crate::core::error::ConfigError;
use crate::core::region::Region;
use crate::streaming::{StreamingOptions, StreamingWarning};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedFilename {
    pub path: PathBuf,
    pub options: StreamingOptions,
    /// Sub-region of the input to write.
    pub box_region: Option<Region>,
    /// 0-based component indices, in output order.
    pub bands: Option<Vec<usize>>,
    /// Keys this crate does not interpret.
    pub extra: IndexMap<String, String>,
    pub warnings: Vec<StreamingWarning>,
}

impl ExtendedFilename {
    pub fn parse(filename: &str) -> Result<Self, ConfigError> {
        let (path, query) = match filename.split_once('?') {
            Some((path, query)) => (path, query),
            None => (filename, ""),
        };
        let mut parsed = ExtendedFilename {
            path: PathBuf::from(path),
            ..Default::default()
        };
        let error = |reason: String| ConfigError::Filename {
            filename: filename.to_string(),
            reason,
        };

        for option in query.split('&').filter(|o| !o.trim().is_empty()) {
            let (key, value) = option
                .split_once('=')
                .ok_or_else(|| error(format!("option '{}' has no value", option)))?;
            let key = key.trim();
            let value = value.trim();

            if key.starts_with("streaming:") {
                parsed.warnings.extend(parsed.options.set(key, value));
                continue;
            }
            match key {
                "box" => parsed.box_region = Some(parse_box(value).map_err(error)?),
                "bands" => parsed.bands = Some(parse_bands(value).map_err(error)?),
                _ => {
                    parsed.warnings.push(StreamingWarning::configuration(format!(
                        "extended filename option '{}' is not used by the writer",
                        key
                    )));
                    parsed.extra.insert(key.to_string(), value.to_string());
                }
            }
        }
        Ok(parsed)
    }
}

impl FromStr for ExtendedFilename {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_box(value: &str) -> Result<Region, String> {
    let fields = value
        .split(':')
        .map(|f| f.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("box '{}' must be x:y:width:height integers", value))?;
    let [x, y, w, h] = fields[..] else {
        return Err(format!("box '{}' must have four fields", value));
    };
    Region::try_new([x, y], [w, h]).map_err(|e| e.to_string())
}

fn parse_bands(value: &str) -> Result<Vec<usize>, String> {
    let band = |text: &str| -> Result<usize, String> {
        match text.trim().parse::<usize>() {
            Ok(0) | Err(_) => Err(format!("band '{}' must be a positive integer", text)),
            Ok(n) => Ok(n - 1),
        }
    };

    let mut bands = Vec::new();
    for item in value.split(',') {
        match item.split_once(':') {
            Some((first, last)) => {
                let (first, last) = (band(first)?, band(last)?);
                if first > last {
                    return Err(format!("band range '{}' is reversed", item));
                }
                bands.extend(first..=last);
            }
            None => bands.push(band(item)?),
        }
    }
    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{SizeMode, StreamingType};

    #[test]
    fn test_full_filename() {
        let parsed = ExtendedFilename::parse(
            "out/a.raw?&streaming:type=tiled&streaming:sizemode=height&streaming:sizevalue=256&box=10:20:512:256&bands=1,3:4",
        )
        .unwrap();
        assert_eq!(parsed.path, PathBuf::from("out/a.raw"));
        assert_eq!(parsed.options.streaming_type, Some(StreamingType::Tiled));
        assert_eq!(parsed.options.sizemode, Some(SizeMode::Height));
        assert_eq!(parsed.options.sizevalue, Some(256));
        assert_eq!(parsed.box_region, Some(Region::new([10, 20], [512, 256])));
        assert_eq!(parsed.bands, Some(vec![0, 2, 3]));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_plain_path() {
        let parsed: ExtendedFilename = "image.png".parse().unwrap();
        assert_eq!(parsed.path, PathBuf::from("image.png"));
        assert!(parsed.options.is_empty());
        assert_eq!(parsed.box_region, None);
    }

    #[test]
    fn test_soft_problems_become_warnings() {
        let parsed =
            ExtendedFilename::parse("a.raw?&streaming:type=diagonal&gdal:co:TILED=YES").unwrap();
        assert_eq!(parsed.warnings.len(), 2);
        assert_eq!(parsed.options.streaming_type, None);
        assert_eq!(parsed.extra.get("gdal:co:TILED").map(String::as_str), Some("YES"));
    }

    #[test]
    fn test_malformed_options_fail() {
        for bad in [
            "a.raw?&box",
            "a.raw?&box=1:2:3",
            "a.raw?&box=0:0:-4:4",
            "a.raw?&bands=0",
            "a.raw?&bands=3:1",
            "a.raw?&bands=x",
        ] {
            assert!(
                matches!(ExtendedFilename::parse(bad), Err(ConfigError::Filename { .. })),
                "{} should fail",
                bad
            );
        }
    }
}
