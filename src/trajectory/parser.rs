use super::Side;
use crate::error::{PlaybackError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// One data row: its recorded time and every cell that held a number.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRow {
    pub time: f64,
    pub commands: HashMap<String, f64>,
}

/// A recorded command file split into per-side joint lists and rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub left_joints: Vec<String>,
    pub right_joints: Vec<String>,
    pub rows: Vec<RecordedRow>,
}

impl Recording {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| PlaybackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Parses a recording. The first column of every row is the time; blank or
    /// non-numeric cells are left out of that row's commands.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if header.len() < 2 {
            return Err(PlaybackError::EmptyRecording);
        }

        let mut left_joints = Vec::new();
        let mut right_joints = Vec::new();
        for name in &header[1..] {
            match Side::of_joint(name) {
                Some(Side::Left) => left_joints.push(name.clone()),
                Some(Side::Right) => right_joints.push(name.clone()),
                None => {}
            }
        }

        let mut rows = Vec::new();
        // Rows are read as bytes so one undecodable cell only drops that cell.
        for (idx, record) in rdr.byte_records().enumerate() {
            let record = record?;
            let time = record
                .get(0)
                .and_then(parse_bytes)
                .ok_or(PlaybackError::MalformedTime { row: idx })?;

            let commands = header[1..]
                .iter()
                .zip(record.iter().skip(1))
                .filter_map(|(name, cell)| parse_bytes(cell).map(|v| (name.clone(), v)))
                .collect();

            rows.push(RecordedRow { time, commands });
        }

        if rows.is_empty() {
            return Err(PlaybackError::EmptyRecording);
        }

        log::debug!(
            "parsed {} rows ({} left joints, {} right joints)",
            rows.len(),
            left_joints.len(),
            right_joints.len()
        );

        Ok(Recording {
            left_joints,
            right_joints,
            rows,
        })
    }

    pub fn joints(&self, side: Side) -> &[String] {
        match side {
            Side::Left => &self.left_joints,
            Side::Right => &self.right_joints,
        }
    }

    /// Time between the first and last recorded rows.
    pub fn duration(&self) -> f64 {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0.0,
        }
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_bytes(cell: &[u8]) -> Option<f64> {
    std::str::from_utf8(cell).ok().and_then(parse_cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "time,left_s0,left_s1,right_s0,left_gripper,right_gripper\n\
                          0.0,0.1,0.2,0.3,50,60\n\
                          0.5,0.15,,0.35,abc,60\n";

    #[test]
    fn splits_joints_by_side() {
        let rec = Recording::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(rec.left_joints, vec!["left_s0", "left_s1"]);
        assert_eq!(rec.right_joints, vec!["right_s0"]);
        assert_eq!(rec.rows.len(), 2);
        assert_eq!(rec.duration(), 0.5);
    }

    #[test]
    fn blank_and_garbage_cells_are_absent() {
        let rec = Recording::from_reader(SAMPLE.as_bytes()).unwrap();
        let row = &rec.rows[1];
        assert_eq!(row.time, 0.5);
        assert_eq!(row.commands.get("left_s0"), Some(&0.15));
        assert!(!row.commands.contains_key("left_s1"));
        assert!(!row.commands.contains_key("left_gripper"));
        assert_eq!(row.commands.get("right_gripper"), Some(&60.0));
    }

    #[test]
    fn undecodable_cell_only_drops_that_cell() {
        let mut bytes = b"time,left_s0,right_s0,left_gripper,right_gripper\n\
                          0.0,0.1,0.1,50,50\n\
                          0.5,"
            .to_vec();
        bytes.extend_from_slice(b"\xff\xfe,0.2,60,60\n");

        let rec = Recording::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(rec.rows.len(), 2);
        let row = &rec.rows[1];
        assert_eq!(row.time, 0.5);
        assert!(!row.commands.contains_key("left_s0"));
        assert_eq!(row.commands.get("right_s0"), Some(&0.2));
        assert_eq!(row.commands.get("right_gripper"), Some(&60.0));
    }

    #[test]
    fn undecodable_time_is_malformed() {
        let mut bytes = b"time,left_s0\n0.0,1\n".to_vec();
        bytes.extend_from_slice(b"\xff,2\n");
        assert!(matches!(
            Recording::from_reader(bytes.as_slice()),
            Err(PlaybackError::MalformedTime { row: 1 })
        ));
    }

    #[test]
    fn short_rows_are_accepted() {
        let rec = Recording::from_reader("time,left_s0,right_s0\n1.0,0.5\n".as_bytes()).unwrap();
        assert_eq!(rec.rows[0].commands.len(), 1);
    }

    #[test]
    fn empty_sources_are_fatal() {
        assert!(matches!(
            Recording::from_reader("".as_bytes()),
            Err(PlaybackError::EmptyRecording)
        ));
        assert!(matches!(
            Recording::from_reader("time,left_s0\n".as_bytes()),
            Err(PlaybackError::EmptyRecording)
        ));
    }

    #[test]
    fn bad_time_column_is_reported() {
        let err = Recording::from_reader("time,left_s0\n0.0,1\nnope,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, PlaybackError::MalformedTime { row: 1 }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Recording::from_path("/nonexistent/recording.csv").unwrap_err();
        assert!(matches!(err, PlaybackError::Io { .. }));
    }
}
