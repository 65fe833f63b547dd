//! Parsing and merging of the raw per-client activity logs.
//!
//! Each client file is free text with repeated blocks of
//! `//// <ActivityName>` followed by brace-delimited numeric records.

use std::fs;
use std::path::Path;

use log::{info, warn};
use regex::Regex;

use crate::common::ActivityLabel;
use crate::error::{PipelineError, Result};

/// One parsed record: raw sensor readings plus the activity of the section
/// it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRecord {
    pub features: Vec<f32>,
    pub label: ActivityLabel,
}

/// Extracts all labeled records from one client's file content.
///
/// Unrecognized activity sections and records that fail numeric parsing are
/// skipped with a warning; neither aborts the file. `source` is only used
/// for diagnostics.
pub fn parse_client_text(content: &str, source: &str) -> Vec<LabeledRecord> {
    let section_re = Regex::new(r"////\s*(\w+)").unwrap();
    let record_re = Regex::new(r"(?s)\{(.*?)\}").unwrap();

    // Section headers with the span of their data block: from the end of the
    // marker to the start of the next one.
    let headers: Vec<(usize, usize, &str)> = section_re
        .captures_iter(content)
        .map(|caps| {
            let m = caps.get(0).unwrap();
            (m.start(), m.end(), caps.get(1).unwrap().as_str())
        })
        .collect();

    let mut records = Vec::new();

    for (idx, &(_, block_start, name)) in headers.iter().enumerate() {
        let block_end = headers
            .get(idx + 1)
            .map(|&(next_start, _, _)| next_start)
            .unwrap_or(content.len());
        let block = &content[block_start..block_end];

        let label = match ActivityLabel::from_name(name) {
            Some(label) => label,
            None => {
                warn!("{}: unrecognized activity section '{}', skipping", source, name);
                continue;
            }
        };

        for caps in record_re.captures_iter(block) {
            let cleaned = caps[1].replace('\n', "");
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                continue;
            }

            let parsed: std::result::Result<Vec<f32>, _> = cleaned
                .split(',')
                .filter(|token| !token.trim().is_empty())
                .map(|token| token.trim().parse::<f32>())
                .collect();

            match parsed {
                Ok(features) => records.push(LabeledRecord { features, label }),
                Err(e) => {
                    let snippet: String = cleaned.chars().take(50).collect();
                    warn!(
                        "{}: could not parse a record for activity '{}': {} (snippet: '{}')",
                        source, name, e, snippet
                    );
                }
            }
        }
    }

    records
}

/// Parses every client file and concatenates the results in client order.
/// A missing file is skipped with a warning.
pub fn merge_client_files(paths: &[impl AsRef<Path>]) -> Result<Vec<LabeledRecord>> {
    let mut all_records = Vec::new();

    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            warn!("client file '{}' not found, skipping", path.display());
            continue;
        }

        info!("processing '{}'", path.display());
        let content = fs::read_to_string(path)?;
        let mut records = parse_client_text(&content, &path.display().to_string());
        info!("  {} records", records.len());
        all_records.append(&mut records);
    }

    Ok(all_records)
}

/// Writes the merged records as CSV rows of features followed by the six
/// one-hot label components. Fails without creating the file when the
/// merged sequence is empty.
pub fn write_merged_csv(records: &[LabeledRecord], path: &Path) -> Result<()> {
    if records.is_empty() {
        return Err(PipelineError::EmptyMerge);
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    for record in records {
        let mut row: Vec<String> = record.features.iter().map(|f| f.to_string()).collect();
        row.extend(record.label.one_hot().iter().map(|c| c.to_string()));
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!("wrote {} merged records to '{}'", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
//// Jogging
{1.0,2.0,3.0}
{4.5,
 5.5, 6.5}
//// Sitting
{0.1,0.2,0.3,}
//// Flying
{9.0,9.0,9.0}
//// Walking
{bad,1.0,2.0}
{7.0,8.0,9.0}
";

    #[test]
    fn parses_sections_and_records() {
        let records = parse_client_text(SAMPLE, "test");
        // The Flying section and the malformed Walking record are skipped.
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].features, vec![1.0, 2.0, 3.0]);
        assert_eq!(records[0].label, ActivityLabel::Jogging);
        // Newlines inside a record are tolerated.
        assert_eq!(records[1].features, vec![4.5, 5.5, 6.5]);
        // Trailing comma yields no extra token.
        assert_eq!(records[2].features, vec![0.1, 0.2, 0.3]);
        assert_eq!(records[2].label, ActivityLabel::Sitting);
        assert_eq!(records[3].features, vec![7.0, 8.0, 9.0]);
        assert_eq!(records[3].label, ActivityLabel::Walking);
    }

    #[test]
    fn feature_count_matches_source_tokens() {
        let records = parse_client_text("//// Standing\n{1,2,3,4,5}\n{6,7}\n", "test");
        assert_eq!(records[0].features.len(), 5);
        assert_eq!(records[1].features.len(), 2);
    }

    #[test]
    fn empty_record_is_skipped() {
        let records = parse_client_text("//// Jogging\n{}\n{ }\n{1,1,1}\n", "test");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn merge_preserves_client_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("Client 1.txt");
        let b = dir.path().join("Client 2.txt");
        std::fs::write(&a, "//// Jogging\n{1,1,1}\n{2,2,2}\n").unwrap();
        std::fs::write(&b, "//// Walking\n{3,3,3}\n").unwrap();

        let merged = merge_client_files(&[&a, &b]).unwrap();
        let features: Vec<f32> = merged.iter().map(|r| r.features[0]).collect();
        assert_eq!(features, vec![1.0, 2.0, 3.0]);

        // Merging [A, B] equals parsing A then B.
        let mut expected = parse_client_text("//// Jogging\n{1,1,1}\n{2,2,2}\n", "a");
        expected.extend(parse_client_text("//// Walking\n{3,3,3}\n", "b"));
        assert_eq!(merged, expected);
    }

    #[test]
    fn missing_client_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("Client 1.txt");
        std::fs::write(&a, "//// Jogging\n{1,1,1}\n").unwrap();
        let missing = dir.path().join("Client 2.txt");

        let merged = merge_client_files(&[&a, &missing]).unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn empty_merge_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("merged.csv");
        let err = write_merged_csv(&[], &out).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyMerge));
        assert!(!out.exists());
    }

    #[test]
    fn merged_row_width_is_features_plus_classes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("merged.csv");
        let records = parse_client_text("//// Upstairs\n{1,2,3}\n", "test");
        write_merged_csv(&records, &out).unwrap();

        let content = std::fs::read_to_string(&out).unwrap();
        let fields: Vec<&str> = content.trim_end().split(',').collect();
        assert_eq!(fields.len(), 3 + crate::common::NUM_CLASSES);
        // Upstairs is code 3: the fourth one-hot slot is set.
        assert_eq!(&fields[3..], ["0", "0", "0", "1", "0", "0"]);
    }

    #[test]
    fn merged_output_equals_per_client_concatenation() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("Client 1.txt");
        let b = dir.path().join("Client 2.txt");
        std::fs::write(&a, "//// Jogging\n{1,2,3}\n{4,5,6}\n").unwrap();
        std::fs::write(&b, "//// Standing\n{7,8,9}\n").unwrap();

        let merged_out = dir.path().join("merged.csv");
        write_merged_csv(&merge_client_files(&[&a, &b]).unwrap(), &merged_out).unwrap();

        let a_out = dir.path().join("a.csv");
        let b_out = dir.path().join("b.csv");
        write_merged_csv(&merge_client_files(&[&a]).unwrap(), &a_out).unwrap();
        write_merged_csv(&merge_client_files(&[&b]).unwrap(), &b_out).unwrap();

        let merged = std::fs::read_to_string(&merged_out).unwrap();
        let concatenated =
            std::fs::read_to_string(&a_out).unwrap() + &std::fs::read_to_string(&b_out).unwrap();
        assert_eq!(merged, concatenated);
    }
}
