//! Save exported artifacts under a file name.

use crate::error::Result;
use crate::platform::Fetcher;
use crate::render::Blob;
use log::{debug, error, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

/// What gets saved: encoded bytes, or a URI the sink could not resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Blob(Blob),
    Uri(String),
}

/// Destination for downloads.
pub trait DownloadSink: Send + Sync {
    fn save(&self, name: &str, artifact: &Artifact) -> Result<()>;
}

/// Resolve `artifact` to bytes where possible and hand it to `sink`.
///
/// A URI that cannot be fetched is saved as the URI string itself.
pub async fn download(
    name: &str,
    artifact: Artifact,
    fetcher: &dyn Fetcher,
    sink: &dyn DownloadSink,
) -> Result<()> {
    let resolved = match artifact {
        Artifact::Uri(uri) => match fetcher.fetch(&uri).await {
            Ok(res) if res.ok() => Artifact::Blob(Blob {
                mime_type: res
                    .content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                bytes: res.body,
            }),
            Ok(res) => {
                error!("GET {} returned {}", uri, res.status);
                warn!("Error while getting object URL. Falling back to string URL.");
                Artifact::Uri(uri)
            }
            Err(e) => {
                error!("{}", e);
                warn!("Error while getting object URL. Falling back to string URL.");
                Artifact::Uri(uri)
            }
        },
        blob => blob,
    };
    sink.save(name, &resolved)
}

/// Writes artifacts into a directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where `name` lands. Directory components in `name` are ignored.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file = Path::new(name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("download"));
        self.dir.join(file)
    }
}

impl DownloadSink for DirectorySink {
    fn save(&self, name: &str, artifact: &Artifact) -> Result<()> {
        let path = self.path_for(name);
        let bytes = match artifact {
            Artifact::Blob(blob) => blob.bytes.as_slice(),
            Artifact::Uri(uri) => uri.as_bytes(),
        };
        std::fs::write(&path, bytes)?;
        debug!("saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// Streams artifacts to standard output. URIs are written as a line of text.
pub struct StdoutSink;

impl DownloadSink for StdoutSink {
    fn save(&self, _name: &str, artifact: &Artifact) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        match artifact {
            Artifact::Blob(blob) => out.write_all(&blob.bytes)?,
            Artifact::Uri(uri) => writeln!(out, "{}", uri)?,
        }
        out.flush()?;
        Ok(())
    }
}
