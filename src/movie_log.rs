use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::error::{DailiesError, DailiesResult};

/// Per-movie log file, written adjacent to the output movie and truncated if
/// it already exists. Lines are `LEVEL<tab>timestamp<tab>message`; each line
/// is also mirrored to the process-wide tracing output.
pub struct RenderLog {
    writer: BufWriter<File>,
}

impl RenderLog {
    pub fn create(path: &Path) -> DailiesResult<Self> {
        let file = File::create(path).map_err(|e| {
            DailiesError::encode(format!("create log '{}': {e}", path.display()))
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write(&mut self, level: &str, msg: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S");
        // A failing log write must never abort the render.
        let _ = writeln!(self.writer, "{level}\t{stamp}\t{msg}");
    }

    pub fn info(&mut self, msg: impl AsRef<str>) {
        tracing::info!("{}", msg.as_ref());
        self.write("INFO", msg.as_ref());
    }

    pub fn warn(&mut self, msg: impl AsRef<str>) {
        tracing::warn!("{}", msg.as_ref());
        self.write("WARNING", msg.as_ref());
    }

    pub fn error(&mut self, msg: impl AsRef<str>) {
        tracing::error!("{}", msg.as_ref());
        self.write("ERROR", msg.as_ref());
    }

    pub fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for RenderLog {
    fn drop(&mut self) {
        self.flush();
    }
}
