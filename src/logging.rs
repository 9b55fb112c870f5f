use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

pub(crate) const LOG_FILE: &str = "swarm.log";

/// Sends every log line to stderr and, when available, appends it to the
/// data directory's log file. Stdout stays reserved for command output.
#[derive(Clone)]
pub(crate) struct TeeMakeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            file: self.file.clone(),
        }
    }
}

pub(crate) struct TeeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = file.write_all(buf); // Ignored if the log file went away
        }
        std::io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            file.flush()?;
        }
        std::io::stderr().flush()
    }
}

pub(crate) fn init_logging(level: Level, data_dir: &Path) {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(LOG_FILE))
        .ok()
        .map(|file| Arc::new(Mutex::new(file)));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(TeeMakeWriter { file })
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_writer_appends_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        let make = TeeMakeWriter {
            file: Some(Arc::new(Mutex::new(file))),
        };
        let mut writer = make.make_writer();
        writer.write_all(b"first line\n").unwrap();
        make.make_writer().write_all(b"second line\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "first line\nsecond line\n"
        );
    }

    #[test]
    fn tee_writer_without_file_still_reports_full_write() {
        let mut writer = TeeWriter { file: None };
        assert_eq!(writer.write(b"stderr only").unwrap(), 11);
    }
}
