//! Compression of completed historical files
//!
//! A [`Compressor`] only turns one finished file into one compressed file.
//! Temporary naming, the final rename and removal of the raw file are
//! handled by the retention worker.

use super::retention::TEMP_SUFFIX;
use crate::core::error::{LoggerError, Result};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

const STREAM_BUFFER: usize = 64 * 1024;

/// Compress a completed file into `destination`
pub trait Compressor: Send + Sync {
    /// Extension appended to the historical file name, without the dot
    fn extension(&self) -> &str;

    /// Stream `source` into a new compressed file at `destination`
    ///
    /// # Errors
    ///
    /// Returns an error if `source` cannot be read or `destination` cannot
    /// be written. The caller removes a partial `destination`.
    fn compress(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// Gzip via flate2
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn extension(&self) -> &str {
        "gz"
    }

    fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        let input = File::open(source).map_err(|e| {
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to open file for compression: {}", source.display()),
                e,
            )
        })?;
        let mut reader = BufReader::with_capacity(STREAM_BUFFER, input);

        let output = File::create(destination).map_err(|e| {
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to create compressed file: {}", destination.display()),
                e,
            )
        })?;
        let mut encoder = flate2::write::GzEncoder::new(
            BufWriter::with_capacity(STREAM_BUFFER, output),
            flate2::Compression::default(),
        );

        io::copy(&mut reader, &mut encoder).map_err(|e| {
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to compress {}", source.display()),
                e,
            )
        })?;

        let mut inner = encoder.finish().map_err(|e| {
            LoggerError::io_operation("compress log file", "Failed to finish compression", e)
        })?;
        inner.flush()?;
        Ok(())
    }
}

/// Single-entry zip archive via the zip crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCompressor;

impl Compressor for ZipCompressor {
    fn extension(&self) -> &str {
        "zip"
    }

    fn compress(&self, source: &Path, destination: &Path) -> Result<()> {
        let entry_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());

        let input = File::open(source).map_err(|e| {
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to open file for compression: {}", source.display()),
                e,
            )
        })?;
        let mut reader = BufReader::with_capacity(STREAM_BUFFER, input);

        let output = File::create(destination).map_err(|e| {
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to create archive: {}", destination.display()),
                e,
            )
        })?;

        let mut archive = zip::ZipWriter::new(BufWriter::with_capacity(STREAM_BUFFER, output));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .large_file(true);

        archive
            .start_file(entry_name, options)
            .map_err(|e| LoggerError::compression(destination.display().to_string(), e.to_string()))?;
        io::copy(&mut reader, &mut archive).map_err(|e| {
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to compress {}", source.display()),
                e,
            )
        })?;

        let mut inner = archive
            .finish()
            .map_err(|e| LoggerError::compression(destination.display().to_string(), e.to_string()))?;
        inner.flush()?;
        Ok(())
    }
}

/// Compression applied to rotated files
#[derive(Clone, Default)]
pub enum Compression {
    None,
    Gzip,
    #[default]
    Zip,
    /// Caller-supplied compressor
    Custom(Arc<dyn Compressor>),
}

impl Compression {
    /// The compressor to run, `None` when files stay raw
    pub fn compressor(&self) -> Option<Arc<dyn Compressor>> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some(Arc::new(GzipCompressor)),
            Compression::Zip => Some(Arc::new(ZipCompressor)),
            Compression::Custom(compressor) => Some(Arc::clone(compressor)),
        }
    }

    pub fn extension(&self) -> Option<&str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Zip => Some("zip"),
            Compression::Custom(compressor) => Some(compressor.extension()),
        }
    }

    /// Check that archives will be recognized as historical files
    ///
    /// An extension is one or more dot-separated parts such as `gz` or
    /// `tar.gz`, made of ASCII letters, digits, `-` and `_`, and not ending
    /// in the temporary suffix.
    pub fn validate(&self) -> Result<()> {
        let Some(extension) = self.extension() else {
            return Ok(());
        };
        let well_formed = extension.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });
        if !well_formed || extension.rsplit('.').next() == Some(TEMP_SUFFIX) {
            return Err(LoggerError::config(
                "compression",
                format!("invalid archive extension '{}'", extension),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => f.write_str("None"),
            Compression::Gzip => f.write_str("Gzip"),
            Compression::Zip => f.write_str("Zip"),
            Compression::Custom(c) => f.debug_tuple("Custom").field(&c.extension()).finish(),
        }
    }
}

impl PartialEq for Compression {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Compression::None, Compression::None)
            | (Compression::Gzip, Compression::Gzip)
            | (Compression::Zip, Compression::Zip) => true,
            (Compression::Custom(a), Compression::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl FromStr for Compression {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().trim_start_matches('.') {
            "" | "none" | "off" => Ok(Compression::None),
            "gz" | "gzip" => Ok(Compression::Gzip),
            "zip" => Ok(Compression::Zip),
            other => Err(LoggerError::config(
                "compression",
                format!("unknown compression '{}', expected none, gz or zip", other),
            )),
        }
    }
}

impl TryFrom<String> for Compression {
    type Error = LoggerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl<'de> serde::Deserialize<'de> for Compression {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_parse_compression() {
        assert_eq!("gz".parse::<Compression>().unwrap(), Compression::Gzip);
        assert_eq!("ZIP".parse::<Compression>().unwrap(), Compression::Zip);
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert!("bz2".parse::<Compression>().unwrap_err().is_config());
    }

    #[test]
    fn test_gzip_round_trip() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.log.1");
        let target = dir.path().join("app.log.1.gz");
        std::fs::write(&source, b"first line\nsecond line\n").unwrap();

        GzipCompressor.compress(&source, &target).unwrap();

        let mut decoder = flate2::read::GzDecoder::new(File::open(&target).unwrap());
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert_eq!(text, "first line\nsecond line\n");
        assert!(source.exists(), "compressor must not remove the source");
    }

    #[test]
    fn test_zip_archive_has_single_entry() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.log.1");
        let target = dir.path().join("app.log.1.zip");
        std::fs::write(&source, b"zipped\n").unwrap();

        ZipCompressor.compress(&source, &target).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&target).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "app.log.1");
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        assert_eq!(text, "zipped\n");
    }

    struct Named(&'static str);

    impl Compressor for Named {
        fn extension(&self) -> &str {
            self.0
        }

        fn compress(&self, _source: &Path, _destination: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_validate_extension() {
        assert!(Compression::None.validate().is_ok());
        assert!(Compression::Zip.validate().is_ok());
        assert!(Compression::Custom(Arc::new(Named("tar.gz"))).validate().is_ok());

        for bad in ["", ".gz", "tar..gz", "gz.tmp", "tmp", "a/b", "gz "] {
            let err = Compression::Custom(Arc::new(Named(bad))).validate().unwrap_err();
            assert!(err.is_config(), "{:?} accepted", bad);
        }
    }

    #[test]
    fn test_missing_source_is_error() {
        let dir = tempdir().unwrap();
        let result = GzipCompressor.compress(&dir.path().join("missing"), &dir.path().join("out.gz"));
        assert!(result.is_err());
    }
}
