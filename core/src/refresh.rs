use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

pub const DEFAULT_MARKER_FILE: &str = "Last_refresh";

const MARKER_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]");
const FRACTIONAL_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
const SECONDS_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Earliest representable instant; returned when no usable marker exists so
/// that every upstream record counts as new.
pub fn earliest() -> PrimitiveDateTime {
    PrimitiveDateTime::new(Date::MIN, Time::MIDNIGHT)
}

/// File holding the timestamp of the last successful ingestion, in UTC.
#[derive(Debug, Clone)]
pub struct RefreshMarker {
    path: PathBuf,
}

impl RefreshMarker {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn last_refresh(&self) -> PrimitiveDateTime {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "refresh marker unreadable, using earliest date");
                return earliest();
            }
        };
        match parse_marker(raw.trim()) {
            Some(ts) => ts,
            None => {
                tracing::warn!(path = %self.path.display(), value = raw.trim(), "malformed refresh marker, using earliest date");
                earliest()
            }
        }
    }

    /// Records the current UTC time as the last refresh.
    pub fn mark_refreshed(&self) -> Result<PrimitiveDateTime> {
        let now = OffsetDateTime::now_utc();
        let ts = PrimitiveDateTime::new(now.date(), now.time());
        self.mark_refreshed_at(ts)?;
        Ok(ts)
    }

    pub fn mark_refreshed_at(&self, ts: PrimitiveDateTime) -> Result<()> {
        let formatted = format_marker(ts);
        fs::write(&self.path, &formatted)?;
        tracing::info!(path = %self.path.display(), last_refresh = %formatted, "refresh marker updated");
        Ok(())
    }
}

pub fn format_marker(ts: PrimitiveDateTime) -> String {
    // the format has no fallible components for in-range values
    ts.format(MARKER_FORMAT).unwrap_or_else(|_| ts.to_string())
}

pub fn parse_marker(raw: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(raw, FRACTIONAL_FORMAT)
        .or_else(|_| PrimitiveDateTime::parse(raw, SECONDS_FORMAT))
        .or_else(|_| Date::parse(raw, DATE_FORMAT).map(|d| d.midnight()))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    #[test]
    fn round_trips_to_the_millisecond() {
        let dir = tempdir().unwrap();
        let marker = RefreshMarker::new(dir.path().join(DEFAULT_MARKER_FILE));
        let ts = datetime!(2025-03-14 9:26:53.589);
        marker.mark_refreshed_at(ts).unwrap();
        assert_eq!(fs::read_to_string(marker.path()).unwrap(), "2025-03-14T09:26:53.589");
        assert_eq!(marker.last_refresh(), ts);
    }

    #[test]
    fn missing_or_malformed_marker_means_earliest() {
        let dir = tempdir().unwrap();
        let marker = RefreshMarker::new(dir.path().join("none"));
        assert_eq!(marker.last_refresh(), earliest());
        fs::write(marker.path(), "yesterday").unwrap();
        assert_eq!(marker.last_refresh(), earliest());
    }

    #[test]
    fn accepts_other_iso_precisions() {
        assert_eq!(parse_marker("2024-11-02T10:00:00"), Some(datetime!(2024-11-02 10:00:00)));
        assert_eq!(parse_marker("2024-11-02T10:00:00.123456"), Some(datetime!(2024-11-02 10:00:00.123456)));
        assert_eq!(parse_marker("2024-11-02"), Some(datetime!(2024-11-02 0:00)));
    }
}
