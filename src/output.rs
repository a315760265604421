use anyhow::anyhow;
use formatx::formatx;
use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Somewhere a report's named CSV files can be written.
pub trait Output: Debug {
    fn writer_for_key(&self, key: &str) -> anyhow::Result<impl Write>;
    /// Whether this output can be considered a no-op and therefore that any code that only writes to the output can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Writes each key to its own file in `directory_path`, named by substituting
/// the key into `file_template` (e.g. `"denver__{}.csv"`).
#[derive(Debug)]
pub struct FileOutput {
    directory_path: PathBuf,
    file_template: String,
}

impl FileOutput {
    pub fn new(directory_path: PathBuf, file_template: String) -> Self {
        Self {
            directory_path,
            file_template,
        }
    }

    pub fn path_for_key(&self, key: &str) -> anyhow::Result<PathBuf> {
        let file_name = formatx!(&self.file_template, key)
            .map_err(|e| anyhow!("invalid file template {}: {e:?}", self.file_template))?;

        Ok(self.directory_path.join(file_name))
    }
}

impl Output for FileOutput {
    fn writer_for_key(&self, key: &str) -> anyhow::Result<impl Write> {
        Ok(BufWriter::new(File::create(self.path_for_key(key)?)?))
    }
}

impl Output for &FileOutput {
    fn writer_for_key(&self, key: &str) -> anyhow::Result<impl Write> {
        <FileOutput as Output>::writer_for_key(self, key)
    }
}

/// An output that goes to nowhere/ a "sink"/ /dev/null.
#[derive(Debug, Default)]
pub struct SinkOutput;

impl Output for SinkOutput {
    fn writer_for_key(&self, _key: &str) -> anyhow::Result<impl Write> {
        Ok(io::sink())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn should_name_files_from_template() {
        let output = FileOutput::new(PathBuf::from("out"), "denver__{}.csv".into());

        assert_eq!(
            output.path_for_key("weather").unwrap(),
            PathBuf::from("out").join("denver__weather.csv")
        );
    }

    #[rstest]
    fn should_discard_sink_writes() {
        let mut writer = SinkOutput.writer_for_key("weather").unwrap();

        assert!(writer.write_all(b"ignored").is_ok());
        assert!(SinkOutput.is_noop());
    }
}
