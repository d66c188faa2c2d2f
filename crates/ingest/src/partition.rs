use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Date-derived location of one day's log: `<root>/tracking/YYYY/MM/tracking_DD.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub dir: PathBuf,
    pub file: PathBuf,
}

impl Partition {
    pub fn for_date(root: &Path, at: DateTime<Utc>) -> Self {
        let dir = root
            .join("tracking")
            .join(at.format("%Y").to_string())
            .join(at.format("%m").to_string());
        let file = dir.join(format!("tracking_{}.json", at.format("%d")));
        Self { dir, file }
    }
}
