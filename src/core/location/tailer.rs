use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Follows a growing text file, returning only complete lines appended since the last read.
pub struct FixTailer {
    file: File,
    position: u64,
    path: PathBuf,
}

impl FixTailer {
    /// Open `path` positioned at its current end.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)?;
        let position = file.metadata()?.len();
        Ok(Self {
            file,
            position,
            path: path_ref.to_path_buf(),
        })
    }

    /// Lines that are not valid UTF-8 are skipped; the read position always moves past them.
    pub fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();

        // A truncated file means the writer started over
        if self.file.metadata()?.len() < self.position {
            self.position = 0;
        }

        self.file.seek(SeekFrom::Start(self.position))?;
        let mut reader = BufReader::new(&self.file);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            let bytes_read = match reader.read_until(b'\n', &mut buffer) {
                Ok(n) => n,
                // Hand back what was already consumed; the next read resumes here
                Err(e) if !lines.is_empty() => {
                    log::warn!("Error reading {}: {}", self.path.display(), e);
                    break;
                }
                Err(e) => return Err(e),
            };
            // Leave a partial last line for the next read
            if bytes_read == 0 || buffer.last() != Some(&b'\n') {
                break;
            }
            self.position += bytes_read as u64;

            match std::str::from_utf8(&buffer) {
                Ok(line) => lines.push(line.trim_end_matches(&['\r', '\n'][..]).to_string()),
                Err(_) => log::warn!(
                    "Skipping non-UTF-8 line in {} before offset {}",
                    self.path.display(),
                    self.position
                ),
            }
        }

        Ok(lines)
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.position = 0;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
