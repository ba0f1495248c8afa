//! Flat fingerprint file.
//!
//! # File Layout
//!
//! ```text
//! fingerprints.bin
//! ├── fp[0]   fpsize/8 bytes, MSB-first
//! ├── fp[1]
//! └── ...     no header, no padding between records
//! ```
//!
//! The file size must be exactly `N * fpsize / 8`; anything else is treated
//! as truncation or corruption.

use crate::error::{Error, Result};
use crate::fingerprint::{FeatureEncoder, Fingerprint};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reads and writes fixed-size fingerprints to a single flat file.
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    path: PathBuf,
    fpsize: usize,
}

impl FingerprintStore {
    /// Creates a store handle for `path` holding `fpsize`-bit fingerprints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if `fpsize` is zero or not a multiple of 8.
    pub fn new<P: AsRef<Path>>(path: P, fpsize: usize) -> Result<Self> {
        if fpsize == 0 || fpsize % 8 != 0 {
            return Err(Error::Format(format!(
                "fingerprint size must be a positive multiple of 8 bits, got {fpsize}"
            )));
        }
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            fpsize,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fingerprint size in bits.
    #[must_use]
    pub fn fpsize(&self) -> usize {
        self.fpsize
    }

    /// Bytes per stored fingerprint.
    #[must_use]
    pub fn record_len(&self) -> usize {
        self.fpsize / 8
    }

    /// Writes `vectors` in order, replacing any existing file.
    ///
    /// The data goes to a temporary sibling first and is renamed into place,
    /// so a failure never leaves a partially written store behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if any vector has the wrong length,
    /// or an IO error.
    pub fn write(&self, vectors: &[Fingerprint]) -> Result<()> {
        for fp in vectors {
            self.check_len(fp)?;
        }

        write_atomically(&self.path, |w| {
            for fp in vectors {
                w.write_all(&fp.to_bytes())?;
            }
            Ok(())
        })?;

        info!(
            path = %self.path.display(),
            count = vectors.len(),
            fpsize = self.fpsize,
            "Wrote fingerprint store"
        );
        Ok(())
    }

    /// Encodes `items` with `encoder` and writes the resulting fingerprints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the encoder's size differs from
    /// the store's, or any error raised by the encoder.
    pub fn write_encoded<E, I>(&self, encoder: &E, items: I) -> Result<usize>
    where
        E: FeatureEncoder,
        I: IntoIterator,
        I::Item: AsRef<E::Item>,
    {
        if encoder.fpsize() != self.fpsize {
            return Err(Error::DimensionMismatch {
                expected: self.fpsize,
                actual: encoder.fpsize(),
            });
        }

        let mut count = 0usize;
        write_atomically(&self.path, |w| {
            for item in items {
                let fp = encoder.encode(item.as_ref())?;
                self.check_len(&fp)?;
                w.write_all(&fp.to_bytes())?;
                count += 1;
            }
            Ok(())
        })?;

        info!(path = %self.path.display(), count, "Encoded and wrote fingerprints");
        Ok(count)
    }

    /// Number of fingerprints in the file, derived from its size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the size is not a whole number of records.
    pub fn count(&self) -> Result<usize> {
        let len = usize::try_from(std::fs::metadata(&self.path)?.len())
            .map_err(|_| Error::Format("fingerprint file too large".into()))?;
        if len % self.record_len() != 0 {
            return Err(Error::Format(format!(
                "file size {len} is not a multiple of the {}-byte record size",
                self.record_len()
            )));
        }
        Ok(len / self.record_len())
    }

    /// Loads exactly `count` fingerprints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the file size is not `count * fpsize / 8`.
    pub fn read(&self, count: usize) -> Result<Vec<Fingerprint>> {
        let file = File::open(&self.path)?;
        let actual = file.metadata()?.len();
        let expected = count
            .checked_mul(self.record_len())
            .ok_or_else(|| Error::Format(format!("record count {count} overflows")))?;

        if actual != expected as u64 {
            return Err(Error::Format(format!(
                "expected {expected} bytes for {count} fingerprints of {} bits, found {actual}",
                self.fpsize
            )));
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        // SAFETY: the file is opened read-only and the store assumes a single
        // writer per run, so the mapping is not mutated while it is alive.
        let mmap = unsafe { Mmap::map(&file)? };

        let fingerprints = mmap
            .chunks_exact(self.record_len())
            .map(|record| Fingerprint::from_bytes(record, self.fpsize))
            .collect::<Result<Vec<_>>>()?;

        debug!(path = %self.path.display(), count, "Loaded fingerprints");
        Ok(fingerprints)
    }

    /// Loads every fingerprint in the file.
    ///
    /// # Errors
    ///
    /// Same as [`count`](Self::count) and [`read`](Self::read).
    pub fn read_all(&self) -> Result<Vec<Fingerprint>> {
        self.read(self.count()?)
    }

    fn check_len(&self, fp: &Fingerprint) -> Result<()> {
        if fp.len() != self.fpsize {
            return Err(Error::DimensionMismatch {
                expected: self.fpsize,
                actual: fp.len(),
            });
        }
        Ok(())
    }
}

/// Writes a file through a temporary sibling and renames it into place.
///
/// On error the temporary file is removed and `path` is left untouched.
pub(crate) fn write_atomically<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let result: Result<()> = (|| {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        body(&mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            std::fs::rename(&tmp_path, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}
