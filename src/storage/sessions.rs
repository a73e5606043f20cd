//! Session log: one JSON object per line

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::clarify::ClarifyingSession;

pub fn write_sessions(path: &Path, sessions: &[ClarifyingSession]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let tmp = path.with_extension("jsonl.tmp");
    {
        let file = File::create(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        for session in sessions {
            serde_json::to_writer(&mut writer, session)
                .with_context(|| format!("Failed to serialize session {}", session.query_id))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
