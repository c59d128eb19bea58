use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::Result;

pub type FrameReader = Box<dyn AsyncRead + Send + Unpin>;

/// FrameSource hands out the raw bytes of each frame, by index.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// open_frame opens frame `index`. `None` means the source is exhausted.
    /// The reader is dropped as soon as the frame was read, or on early exit.
    async fn open_frame(&self, index: usize) -> Result<Option<FrameReader>>;
}

/// FileSequenceSource reads frame `i` from `<dir>/<prefix><i><suffix>`, for
/// example `h264/sample-0.h264`. The first missing file ends the sequence.
#[derive(Debug, Clone)]
pub struct FileSequenceSource {
    dir: PathBuf,
    prefix: String,
    suffix: String,
}

impl FileSequenceSource {
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        FileSequenceSource {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", self.prefix, index, self.suffix))
    }
}

#[async_trait]
impl FrameSource for FileSequenceSource {
    async fn open_frame(&self, index: usize) -> Result<Option<FrameReader>> {
        let path = self.path_for(index);
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("frame source exhausted at {}", path.display());
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// MemoryFrameSource serves frames held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameSource {
    frames: Vec<Bytes>,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Bytes>) -> Self {
        MemoryFrameSource { frames }
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    async fn open_frame(&self, index: usize) -> Result<Option<FrameReader>> {
        Ok(self
            .frames
            .get(index)
            .map(|frame| Box::new(Cursor::new(frame.clone())) as FrameReader))
    }
}

#[cfg(test)]
mod test {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_file_sequence_source() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("rtc-client-frames-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await?;

        let source = FileSequenceSource::new(&dir, "sample-", ".h264");
        tokio::fs::write(source.path_for(0), b"frame zero").await?;
        tokio::fs::write(source.path_for(1), b"frame one").await?;

        assert!(source.path_for(1).ends_with("sample-1.h264"));

        for (index, expected) in [(0, "frame zero"), (1, "frame one")] {
            let mut reader = source.open_frame(index).await?.expect("frame present");
            let mut buf = String::new();
            reader.read_to_string(&mut buf).await?;
            assert_eq!(buf, expected);
        }
        assert!(source.open_frame(2).await?.is_none());

        tokio::fs::remove_dir_all(&dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_frame_source() -> Result<()> {
        let source = MemoryFrameSource::new(vec![Bytes::from_static(b"abc")]);

        let mut reader = source.open_frame(0).await?.expect("frame present");
        let mut buf = vec![];
        reader.read_to_end(&mut buf).await?;
        assert_eq!(buf, b"abc");
        assert!(source.open_frame(1).await?.is_none());

        Ok(())
    }
}
