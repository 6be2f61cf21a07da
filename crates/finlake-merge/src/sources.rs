use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use finlake_core::RunMode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::MergeError;

/// Processing stage of a table within one run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Must yield valid rows or the run aborts.
    Base,
    /// Validated against the base table's valid rows.
    Dependent,
    /// Validated on its own.
    Independent,
    /// Dependent table that only exists for live runs.
    LiveOnly,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Base => "base",
            Stage::Dependent => "dependent",
            Stage::Independent => "independent",
            Stage::LiveOnly => "live_only",
        }
    }

    pub fn uses_references(&self) -> bool {
        matches!(self, Stage::Dependent | Stage::LiveOnly)
    }
}

/// How periodized raw files are laid out under a source directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceLayout {
    /// `dir/YYYY/MM/DD/<file>`
    Daily,
    /// `dir/YYYY/<file>`
    YearlyFolder,
    /// `dir/YYYY.csv`
    YearlyFile,
}

/// Where a logical table's raw files live and how its rows are prepared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSource {
    pub name: String,
    pub stage: Stage,
    pub layout: SourceLayout,
    /// Directory relative to the data root.
    pub dir: PathBuf,
    /// File name inside each period folder; unused for yearly files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Columns identifying one entity; duplicates keep the last row.
    pub entity_key: Vec<String>,
    /// Rows carry bare `Qn` labels dated by the file's year.
    #[serde(default)]
    pub quarterly: bool,
    /// Optional projection applied before validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Columns stripped of `$` and `,` before validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub numeric_cleanup: Vec<String>,
}

/// The stock pipeline's table layout.
pub fn default_sources() -> Vec<TableSource> {
    vec![
        TableSource {
            name: "stocks_raw".to_string(),
            stage: Stage::Base,
            layout: SourceLayout::Daily,
            dir: PathBuf::from("stocks_data"),
            file: Some("stocks.csv".to_string()),
            entity_key: keys(&["ticker", "date"]),
            quarterly: false,
            columns: None,
            numeric_cleanup: Vec::new(),
        },
        TableSource {
            name: "company_metadata".to_string(),
            stage: Stage::Dependent,
            layout: SourceLayout::YearlyFolder,
            dir: PathBuf::from("company_metadata"),
            file: Some("company_details.csv".to_string()),
            entity_key: keys(&["rank"]),
            quarterly: false,
            columns: Some(keys(&[
                "rank",
                "company",
                "industry",
                "revenue",
                "employees",
                "ticker",
            ])),
            numeric_cleanup: keys(&["revenue", "employees"]),
        },
        TableSource {
            name: "exchange_rates".to_string(),
            stage: Stage::Independent,
            layout: SourceLayout::YearlyFile,
            dir: PathBuf::from("exchange_rates"),
            file: None,
            entity_key: keys(&["date"]),
            quarterly: false,
            columns: None,
            numeric_cleanup: Vec::new(),
        },
        TableSource {
            name: "macro_raw".to_string(),
            stage: Stage::Independent,
            layout: SourceLayout::YearlyFile,
            dir: PathBuf::from("macro_data"),
            file: None,
            entity_key: keys(&["quarter"]),
            quarterly: true,
            columns: None,
            numeric_cleanup: Vec::new(),
        },
        TableSource {
            name: "sentiment".to_string(),
            stage: Stage::LiveOnly,
            layout: SourceLayout::Daily,
            dir: PathBuf::from("sentiment_analysis"),
            file: Some("sentiment.csv".to_string()),
            entity_key: keys(&["ticker", "date"]),
            quarterly: false,
            columns: None,
            numeric_cleanup: Vec::new(),
        },
    ]
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// One raw file selected for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Year of the period the file belongs to.
    pub year: i32,
}

impl TableSource {
    fn file_name(&self) -> Result<&str, MergeError> {
        self.file.as_deref().ok_or_else(|| {
            MergeError::Config(format!("table {} needs a file name for its layout", self.name))
        })
    }

    /// Locate the raw files covering `mode`, ordered by period.
    ///
    /// A missing source directory or live file is an error; historical
    /// periods without a file are skipped.
    pub fn discover(&self, data_root: &Path, mode: &RunMode) -> Result<Vec<SourceFile>, MergeError> {
        let root = data_root.join(&self.dir);
        match mode {
            RunMode::Live { date } => self.live_file(&root, *date).map(|file| vec![file]),
            RunMode::Historical { start, end } => {
                if !root.is_dir() {
                    return Err(MergeError::MissingSource(root));
                }
                match self.layout {
                    SourceLayout::Daily => self.daily_files(&root, *start, *end),
                    SourceLayout::YearlyFolder => self.yearly_folder_files(&root, *start, *end),
                    SourceLayout::YearlyFile => yearly_files(&root, *start, *end),
                }
            }
        }
    }

    fn live_file(&self, root: &Path, date: NaiveDate) -> Result<SourceFile, MergeError> {
        let path = match self.layout {
            SourceLayout::Daily => root
                .join(date.year().to_string())
                .join(format!("{:02}", date.month()))
                .join(format!("{:02}", date.day()))
                .join(self.file_name()?),
            SourceLayout::YearlyFolder => root.join(date.year().to_string()).join(self.file_name()?),
            SourceLayout::YearlyFile => root.join(format!("{}.csv", date.year())),
        };
        if !path.is_file() {
            return Err(MergeError::MissingSource(path));
        }
        Ok(SourceFile {
            path,
            year: date.year(),
        })
    }

    fn daily_files(
        &self,
        root: &Path,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SourceFile>, MergeError> {
        let file_name = self.file_name()?;
        let mut found = Vec::new();
        for (year, year_dir) in numeric_dirs(root)? {
            if year < start.year() as u32 || year > end.year() as u32 {
                continue;
            }
            let year = year as i32;
            for (month, month_dir) in numeric_dirs(&year_dir)? {
                if (year == start.year() && month < start.month())
                    || (year == end.year() && month > end.month())
                {
                    continue;
                }
                for (day, day_dir) in numeric_dirs(&month_dir)? {
                    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                        debug!(path = %day_dir.display(), "skipping folder that is not a calendar day");
                        continue;
                    };
                    if date < start || date > end {
                        continue;
                    }
                    let path = day_dir.join(file_name);
                    if path.is_file() {
                        found.push((date, SourceFile { path, year }));
                    }
                }
            }
        }
        found.sort_by_key(|(date, _)| *date);
        Ok(found.into_iter().map(|(_, file)| file).collect())
    }

    fn yearly_folder_files(
        &self,
        root: &Path,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SourceFile>, MergeError> {
        let file_name = self.file_name()?;
        let mut found = Vec::new();
        for (year, year_dir) in numeric_dirs(root)? {
            let year = year as i32;
            if year < start.year() || year > end.year() {
                continue;
            }
            let path = year_dir.join(file_name);
            if path.is_file() {
                found.push(SourceFile { path, year });
            }
        }
        found.sort_by_key(|file| file.year);
        Ok(found)
    }
}

fn yearly_files(root: &Path, start: NaiveDate, end: NaiveDate) -> Result<Vec<SourceFile>, MergeError> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "csv") {
            continue;
        }
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let Ok(year) = stem.parse::<i32>() else {
            warn!(path = %path.display(), "skipping file without a year name");
            continue;
        };
        if year < start.year() || year > end.year() {
            continue;
        }
        found.push(SourceFile { path, year });
    }
    found.sort_by_key(|file| file.year);
    Ok(found)
}

/// Sub-directories whose names parse as numbers.
fn numeric_dirs(dir: &Path) -> Result<Vec<(u32, PathBuf)>, MergeError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Ok(number) = name.parse::<u32>() {
            dirs.push((number, path));
        }
    }
    dirs.sort_by_key(|(number, _)| *number);
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, "a\n1\n").expect("write file");
    }

    #[test]
    fn daily_walk_prunes_to_the_requested_range() {
        let root = std::env::temp_dir().join(format!("finlake_daily_{}", uuid::Uuid::new_v4()));
        let source = &default_sources()[0];
        let base = root.join("stocks_data");
        touch(&base.join("2024/11/30/stocks.csv"));
        touch(&base.join("2024/12/01/stocks.csv"));
        touch(&base.join("2024/12/31/stocks.csv"));
        touch(&base.join("2025/01/01/stocks.csv"));
        touch(&base.join("2024/12/notes/stocks.csv"));
        fs::create_dir_all(base.join("2024/12/02")).expect("empty day");

        let mode = RunMode::historical(date(2024, 12, 1), date(2024, 12, 31)).expect("range");
        let files = source.discover(&root, &mode).expect("discover");
        let days: Vec<String> = files
            .iter()
            .map(|file| file.path.parent().expect("day").display().to_string())
            .collect();
        assert_eq!(files.len(), 2);
        assert!(days[0].ends_with("01"));
        assert!(days[1].ends_with("31"));
    }

    #[test]
    fn live_mode_reads_the_current_period_only() {
        let root = std::env::temp_dir().join(format!("finlake_live_{}", uuid::Uuid::new_v4()));
        let sources = default_sources();
        touch(&root.join("exchange_rates/2024.csv"));
        touch(&root.join("exchange_rates/2023.csv"));

        let mode = RunMode::Live { date: date(2024, 6, 3) };
        let files = sources[2].discover(&root, &mode).expect("discover");
        assert_eq!(files, vec![SourceFile {
            path: root.join("exchange_rates/2024.csv"),
            year: 2024
        }]);

        let err = sources[0].discover(&root, &mode).expect_err("no stocks file");
        assert!(matches!(err, MergeError::MissingSource(_)));
    }

    #[test]
    fn yearly_files_skip_names_that_are_not_years() {
        let root = std::env::temp_dir().join(format!("finlake_yearly_{}", uuid::Uuid::new_v4()));
        let sources = default_sources();
        touch(&root.join("macro_data/2023.csv"));
        touch(&root.join("macro_data/2024.csv"));
        touch(&root.join("macro_data/latest.csv"));

        let mode = RunMode::historical(date(2024, 1, 1), date(2024, 12, 31)).expect("range");
        let files = sources[3].discover(&root, &mode).expect("discover");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].year, 2024);
    }

    #[test]
    fn missing_directory_is_reported() {
        let root = std::env::temp_dir().join(format!("finlake_none_{}", uuid::Uuid::new_v4()));
        let mode = RunMode::historical(date(2024, 1, 1), date(2024, 1, 31)).expect("range");
        let err = default_sources()[1]
            .discover(&root, &mode)
            .expect_err("no directory");
        assert!(matches!(err, MergeError::MissingSource(path) if path.ends_with("company_metadata")));
    }
}
