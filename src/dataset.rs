//! Ingestion of the raw sensor table and segmentation into fixed windows.

use std::collections::HashSet;
use std::path::Path;

use log::{info, warn};
use ndarray::{Array1, Array3};

use crate::common::{ActivityLabel, NUM_CHANNELS, NUM_CLASSES};
use crate::error::Result;

/// One filtered row of the raw sensor table.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRow {
    pub user: i64,
    pub label: ActivityLabel,
    pub timestamp: i64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Reads the raw table (`user,activity,timestamp,x,y,z;` with no header).
///
/// The trailing semicolon on the z field is stripped before parsing. Rows
/// with any unparsable field, an unknown activity, or a zero timestamp are
/// dropped. Row order is preserved: windowing relies on positional
/// contiguity, not timestamp sorting.
pub fn read_sensor_table(path: &Path) -> Result<Vec<SensorRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping unreadable row: {}", e);
                dropped += 1;
                continue;
            }
        };

        match parse_sensor_record(&record) {
            Some(row) => rows.push(row),
            None => dropped += 1,
        }
    }

    info!(
        "loaded {} sensor rows from '{}' ({} dropped)",
        rows.len(),
        path.display(),
        dropped
    );
    Ok(rows)
}

fn parse_sensor_record(record: &csv::StringRecord) -> Option<SensorRow> {
    if record.len() < 6 {
        return None;
    }

    let user = record.get(0)?.trim().parse::<i64>().ok()?;
    let label = ActivityLabel::from_name(record.get(1)?.trim())?;
    let timestamp = record.get(2)?.trim().parse::<i64>().ok()?;
    if timestamp == 0 {
        return None;
    }
    let x = record.get(3)?.trim().parse::<f32>().ok()?;
    let y = record.get(4)?.trim().parse::<f32>().ok()?;
    let z = record
        .get(5)?
        .trim()
        .trim_end_matches(';')
        .parse::<f32>()
        .ok()?;

    Some(SensorRow {
        user,
        label,
        timestamp,
        x,
        y,
        z,
    })
}

/// Keeps all rows belonging to the users observed in the first `fraction`
/// of the table, preserving row order.
pub fn select_user_subset(rows: Vec<SensorRow>, fraction: f32) -> Vec<SensorRow> {
    let head = (rows.len() as f32 * fraction) as usize;
    let users: HashSet<i64> = rows[..head.min(rows.len())]
        .iter()
        .map(|r| r.user)
        .collect();

    let total = rows.len();
    let subset: Vec<SensorRow> = rows
        .into_iter()
        .filter(|r| users.contains(&r.user))
        .collect();

    info!(
        "user subset: {} users from the first {:.0}% of rows, {} of {} rows kept",
        users.len(),
        fraction * 100.0,
        subset.len(),
        total
    );
    subset
}

/// Slices the table into fixed-length windows of shape
/// `(num_windows, window_size, 3)` with one label per window.
///
/// Start indices range over `[0, len - window_size)` stepping by `stride`,
/// so a trailing partial window is dropped, never padded. The label is the
/// mode of the slice's row labels; ties go to the lowest code.
pub fn make_windows(
    rows: &[SensorRow],
    window_size: usize,
    stride: usize,
) -> Result<(Array3<f32>, Array1<i64>)> {
    let mut features = Vec::new();
    let mut labels = Vec::new();
    let mut num_windows = 0usize;

    if rows.len() > window_size {
        let mut start = 0;
        while start < rows.len() - window_size {
            let slice = &rows[start..start + window_size];
            for row in slice {
                features.extend_from_slice(&[row.x, row.y, row.z]);
            }
            labels.push(majority_label(slice) as i64);
            num_windows += 1;
            start += stride;
        }
    }

    let x = Array3::from_shape_vec((num_windows, window_size, NUM_CHANNELS), features)?;
    let y = Array1::from_vec(labels);
    info!("windowing produced {} windows of {}x{}", num_windows, window_size, NUM_CHANNELS);
    Ok((x, y))
}

/// Most frequent label code in the slice, lowest code on ties.
fn majority_label(rows: &[SensorRow]) -> usize {
    let mut counts = [0usize; NUM_CLASSES];
    for row in rows {
        counts[row.label.code()] += 1;
    }

    let mut best = 0;
    for code in 1..NUM_CLASSES {
        if counts[code] > counts[best] {
            best = code;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(label: ActivityLabel, value: f32) -> SensorRow {
        SensorRow {
            user: 1,
            label,
            timestamp: 1,
            x: value,
            y: value + 0.5,
            z: value + 1.0,
        }
    }

    #[test]
    fn reads_table_and_drops_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.txt");
        std::fs::write(
            &path,
            "33,Jogging,49105962326000,-0.69,12.68,0.50;\n\
             33,Jogging,0,1.0,2.0,3.0;\n\
             33,Skating,49106062271000,1.0,2.0,3.0;\n\
             33,Walking,49106062271000,oops,2.0,3.0;\n\
             33,Walking,49106112167000,5.01,11.26,1.57;\n",
        )
        .unwrap();

        let rows = read_sensor_table(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, ActivityLabel::Jogging);
        // The trailing semicolon is stripped from the z field.
        assert!((rows[0].z - 0.50).abs() < 1e-6);
        assert_eq!(rows[1].label, ActivityLabel::Walking);
    }

    #[test]
    fn hundred_rows_make_three_windows() {
        let rows: Vec<SensorRow> = (0..100)
            .map(|i| row(ActivityLabel::Jogging, i as f32))
            .collect();
        let (x, y) = make_windows(&rows, 30, 30).unwrap();
        assert_eq!(x.shape(), &[3, 30, 3]);
        assert_eq!(y.len(), 3);
        // The last window covers rows 60..90; the trailing 10 rows are dropped.
        assert_eq!(x[[2, 29, 0]], 89.0);
    }

    #[test]
    fn short_table_yields_no_windows() {
        let rows: Vec<SensorRow> = (0..20)
            .map(|i| row(ActivityLabel::Sitting, i as f32))
            .collect();
        let (x, y) = make_windows(&rows, 30, 30).unwrap();
        assert_eq!(x.shape(), &[0, 30, 3]);
        assert_eq!(y.len(), 0);
    }

    #[test]
    fn window_label_is_majority() {
        let mut rows: Vec<SensorRow> = (0..29)
            .map(|i| row(ActivityLabel::Jogging, i as f32))
            .collect();
        rows.push(row(ActivityLabel::Walking, 29.0));
        // Pad past the window so the slice at 0 is emitted.
        rows.extend((0..10).map(|i| row(ActivityLabel::Walking, i as f32)));

        let (_, y) = make_windows(&rows, 30, 30).unwrap();
        assert_eq!(y[0], ActivityLabel::Jogging.code() as i64);
    }

    #[test]
    fn majority_tie_goes_to_lowest_code() {
        let mut rows: Vec<SensorRow> = Vec::new();
        rows.extend((0..15).map(|i| row(ActivityLabel::Standing, i as f32)));
        rows.extend((0..15).map(|i| row(ActivityLabel::Walking, i as f32)));
        rows.extend((0..10).map(|i| row(ActivityLabel::Walking, i as f32)));

        let (_, y) = make_windows(&rows, 30, 30).unwrap();
        // Walking (code 1) and Standing (code 5) both appear 15 times.
        assert_eq!(y[0], ActivityLabel::Walking.code() as i64);
    }

    #[test]
    fn channel_layout_is_row_major() {
        let rows: Vec<SensorRow> = (0..40)
            .map(|i| row(ActivityLabel::Upstairs, i as f32))
            .collect();
        let (x, _) = make_windows(&rows, 30, 30).unwrap();
        // window[t] = [x, y, z] of source row t
        assert_eq!(x[[0, 5, 0]], 5.0);
        assert_eq!(x[[0, 5, 1]], 5.5);
        assert_eq!(x[[0, 5, 2]], 6.0);
    }

    #[test]
    fn subset_keeps_all_rows_of_selected_users() {
        let mut rows: Vec<SensorRow> = Vec::new();
        for user in [1i64, 2, 3] {
            for i in 0..10 {
                let mut r = row(ActivityLabel::Jogging, i as f32);
                r.user = user;
                rows.push(r);
            }
        }
        // First 40% of 30 rows = 12 rows, covering users 1 and 2.
        let subset = select_user_subset(rows, 0.4);
        assert_eq!(subset.len(), 20);
        assert!(subset.iter().all(|r| r.user != 3));
    }
}
