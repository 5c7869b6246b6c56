use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use downwatch_core::report::{self, CriticalGroup, ReportEntry};

pub const FULL_REPORT_FILE: &str = "Full_PRTG_Report.txt";
pub const CRITICAL_REPORT_FILE: &str = "Critical_Sites_Report.txt";

/// Text exports of the two reports, written into one directory.
#[derive(Debug, Clone)]
pub struct ReportFiles {
    out_dir: PathBuf,
}

impl ReportFiles {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn full_path(&self) -> PathBuf {
        self.out_dir.join(FULL_REPORT_FILE)
    }

    pub fn critical_path(&self) -> PathBuf {
        self.out_dir.join(CRITICAL_REPORT_FILE)
    }

    pub fn write_full(&self, entries: &[ReportEntry]) -> Result<PathBuf> {
        let path = self.full_path();
        write_text(&path, &report::render_full(entries))?;
        Ok(path)
    }

    pub fn write_critical(&self, groups: &[CriticalGroup]) -> Result<PathBuf> {
        let path = self.critical_path();
        write_text(&path, &report::render_critical(groups))?;
        Ok(path)
    }
}

pub fn read_full_report(path: &Path) -> Result<Vec<ReportEntry>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let entries = report::parse_full(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(entries)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
}
