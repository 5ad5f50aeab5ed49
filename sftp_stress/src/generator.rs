use std::io::{Cursor, Write};
use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Result, StressError};

/// Name of the single entry inside every generated archive.
pub const ENTRY_NAME: &str = "data.bin";

/// Payloads above this get zip64 headers. Deflate can grow incompressible data slightly,
/// so the cut-off sits well below the 4 GiB limit of the plain zip size fields.
const ZIP64_THRESHOLD: u64 = 1 << 31;

fn needs_zip64(size: u64) -> bool {
    size > ZIP64_THRESHOLD
}

/// An in-memory zip archive ready to upload.
#[derive(Clone, Debug)]
pub struct GeneratedFile {
    /// Size of the random payload inside the archive. This is the size that gets reported.
    pub size: u64,
    /// The archive itself.
    pub bytes: Vec<u8>,
}

/// Builds zip archives of random content. Owns its RNG so runs can be reproduced by seeding it.
pub struct FileGenerator<R = StdRng> {
    rng: R,
}

impl FileGenerator<StdRng> {
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> FileGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Draws a payload size uniformly from `size_range` and returns a deflate-compressed
    /// archive holding that many random bytes under [ENTRY_NAME].
    pub fn generate(&mut self, size_range: RangeInclusive<u64>) -> Result<GeneratedFile> {
        if size_range.is_empty() {
            return Err(StressError::EmptySizeRange {
                min: *size_range.start(),
                max: *size_range.end(),
            });
        }
        let size = self.rng.random_range(size_range);

        let mut payload = vec![0u8; size as usize];
        self.rng.fill(&mut payload[..]);

        // Random data doesn't compress, so the archive ends up slightly larger than the payload.
        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(payload.len() + 512)));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(needs_zip64(size));
        writer.start_file(ENTRY_NAME, options)?;
        writer.write_all(&payload).map_err(|e| StressError::Archive(e.into()))?;
        let bytes = writer.finish()?.into_inner();

        Ok(GeneratedFile { size, bytes })
    }
}
