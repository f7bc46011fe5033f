//! JSON adapters for the command-line driver.
//!
//! Bars and events are read as JSON arrays of [`PriceBar`] / [`Event`]; the
//! report is written as pretty JSON. Anything fancier (CSV, Parquet, vendor
//! APIs) belongs to upstream ingestion.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::errors::Result;
use crate::models::bar::PriceBar;
use crate::models::event::Event;
use crate::study::StudyReport;

pub fn read_bars_path(path: impl AsRef<Path>) -> Result<Vec<PriceBar>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn read_events_path(path: impl AsRef<Path>) -> Result<Vec<Event>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_report_path(path: impl AsRef<Path>, report: &StudyReport) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bar_and_event_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let bars = dir.path().join("bars.json");
        let mut f = File::create(&bars).unwrap();
        writeln!(
            f,
            r#"[{{"timestamp":"2025-04-08T13:30:00Z","open":1,"high":1,"low":1,"close":1,"volume":5}}]"#
        )
        .unwrap();
        let loaded = read_bars_path(&bars).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].volume, 5);

        let events = dir.path().join("events.json");
        std::fs::write(
            &events,
            r#"[{"id":"p1","timestamp":"2025-04-08T13:32:00Z","sentiment":"MARKET_HOSTILE","category":"China"}]"#,
        )
        .unwrap();
        let evs = read_events_path(&events).unwrap();
        assert_eq!(evs[0].category, "China");
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.json");
        std::fs::write(&p, "[{").unwrap();
        assert!(matches!(read_events_path(&p), Err(crate::Error::Json(_))));
        assert!(matches!(
            read_bars_path(dir.path().join("missing.json")),
            Err(crate::Error::Io(_))
        ));
    }
}
