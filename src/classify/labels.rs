//! # Label Vocabulary
//!
//! The classifier's label vocabulary is open-ended and loaded from an external
//! class-map definition at startup, not hardcoded as an enumeration. The file is
//! the AudioSet/YAMNet class-map CSV shape: `index,mid,display_name` with a header
//! row; only the display name is used here.

use crate::error::{AppError, AppResult};
use std::path::Path;

/// Lookup table from model class index to display name.
#[derive(Debug, Clone)]
pub struct LabelMap {
    names: Vec<String>,
}

impl LabelMap {
    /// Load a class map from a CSV file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Config(format!(
                "failed to read class map {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_csv(&contents)
    }

    /// Parse class-map CSV contents: header row, then `index,mid,display_name`.
    pub fn from_csv(contents: &str) -> AppResult<Self> {
        let names: Vec<String> = contents
            .lines()
            .skip(1) // header
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.splitn(3, ',')
                    .nth(2)
                    .map(|name| name.trim().trim_matches('"').to_string())
                    .ok_or_else(|| {
                        AppError::Config(format!("malformed class map line: {}", line))
                    })
            })
            .collect::<AppResult<_>>()?;

        let map = Self { names };
        if map.is_empty() {
            return Err(AppError::Config("class map contains no labels".to_string()));
        }

        Ok(map)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "index,mid,display_name\n\
                          0,/m/09x0r,Speech\n\
                          1,/m/0bt9lr,Dog\n\
                          2,/m/05zppz,\"Bark\"\n";

    #[test]
    fn test_parse_skips_header_and_reads_display_names() {
        let labels = LabelMap::from_csv(SAMPLE).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.name(0), Some("Speech"));
        assert_eq!(labels.name(1), Some("Dog"));
        assert_eq!(labels.name(2), Some("Bark"));
    }

    #[test]
    fn test_out_of_range_index_is_none() {
        let labels = LabelMap::from_csv(SAMPLE).unwrap();
        assert_eq!(labels.name(3), None);
    }

    #[test]
    fn test_empty_class_map_is_rejected() {
        assert!(LabelMap::from_csv("index,mid,display_name\n").is_err());
    }

    #[test]
    fn test_malformed_line_is_rejected() {
        let contents = "index,mid,display_name\n0,missing-name\n";
        assert!(LabelMap::from_csv(contents).is_err());
    }
}
