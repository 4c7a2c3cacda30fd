use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::{Context, Result};
use config::enums::LockStrategy;
use log::info;

use crate::filter::{RingFilter, DEFAULT_SHARD_DIMENSION};

const FILE_NAME: &str = "ring_filter";

pub struct RingFilterWriter {
    base_directory: String,
}

impl RingFilterWriter {
    pub fn new(base_directory: String) -> Self {
        Self { base_directory }
    }

    /// Writes `<base_directory>/ring_filter` in the checksummed stream format.
    pub fn write(&self, ring_filter: &RingFilter) -> Result<u64> {
        let path = format!("{}/{}", self.base_directory, FILE_NAME);
        let file = File::create(&path).with_context(|| format!("Failed to create {path}"))?;
        let bytes_written = ring_filter.write_to(BufWriter::new(file))?;
        info!("Wrote {bytes_written} bytes of ring filter to {path}");
        Ok(bytes_written)
    }
}

pub struct RingFilterReader {
    base_directory: String,
}

impl RingFilterReader {
    pub fn new(base_directory: String) -> Self {
        Self { base_directory }
    }

    pub fn read(&self) -> Result<RingFilter> {
        self.read_with_strategy(LockStrategy::Single, DEFAULT_SHARD_DIMENSION)
    }

    pub fn read_with_strategy(
        &self,
        strategy: LockStrategy,
        shard_dimension: usize,
    ) -> Result<RingFilter> {
        let path = format!("{}/{}", self.base_directory, FILE_NAME);
        let file = File::open(&path).with_context(|| format!("Failed to open {path}"))?;
        let ring_filter =
            RingFilter::from_reader_with(BufReader::new(file), strategy, shard_dimension)?;
        info!(
            "Read ring filter with {} bits from {path}",
            ring_filter.bit_count()
        );
        Ok(ring_filter)
    }
}
