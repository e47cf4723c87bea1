use std::path::Path;

use anyhow::Context;

use crate::errwarns::CoreError;

/// Caller-injected filesystem for binary inclusion. The core never opens
/// files on its own; drivers own external resources and hand in whatever
/// lookup policy they want.
pub trait BinaryFS {
    fn read(&self, path: &Path) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Default)]
pub struct StdBinaryFS;

impl BinaryFS for StdBinaryFS {
    fn read(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))
    }
}

/// Raw file inclusion. The payload is read once at construction, so the
/// tail length is known immediately and output never touches the
/// filesystem.
#[derive(Debug, Clone)]
pub struct IncbinContents {
    path: String,
    data: Vec<u8>,
}

impl IncbinContents {
    pub fn new(
        path: impl Into<String>,
        start: Option<u64>,
        max_len: Option<u64>,
        fs: &dyn BinaryFS,
    ) -> Result<Self, CoreError> {
        let path = path.into();
        let mut data = fs.read(Path::new(&path)).map_err(|err| CoreError::Io {
            path: path.clone(),
            message: format!("{err:#}"),
        })?;

        if let Some(start) = start {
            let start = usize::try_from(start).unwrap_or(usize::MAX);
            if start > data.len() {
                return Err(CoreError::Value(format!(
                    "incbin start {start} is past the end of '{path}' ({} bytes)",
                    data.len()
                )));
            }
            data.drain(..start);
        }
        if let Some(max_len) = max_len {
            data.truncate(usize::try_from(max_len).unwrap_or(usize::MAX));
        }

        Ok(Self { path, data })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFS(Vec<u8>);

    impl BinaryFS for FixedFS {
        fn read(&self, _path: &Path) -> anyhow::Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    struct MissingFS;

    impl BinaryFS for MissingFS {
        fn read(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("no such file '{}'", path.display())
        }
    }

    #[test]
    fn slices_start_and_max_len() {
        let fs = FixedFS(vec![1, 2, 3, 4, 5]);
        let incbin = IncbinContents::new("blob.bin", Some(1), Some(3), &fs).expect("incbin");
        assert_eq!(incbin.data(), &[2, 3, 4]);
        assert_eq!(incbin.len(), 3);
    }

    #[test]
    fn start_past_end_is_an_error() {
        let fs = FixedFS(vec![1, 2]);
        let err = IncbinContents::new("blob.bin", Some(5), None, &fs).expect_err("start");
        assert!(err.to_string().contains("past the end"));
    }

    #[test]
    fn read_failure_becomes_io_error() {
        let err = IncbinContents::new("gone.bin", None, None, &MissingFS).expect_err("missing");
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
