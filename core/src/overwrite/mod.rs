//! Direct-I/O overwrite pipeline (the Clear / software-overwrite engine).
//!
//! One pass writes the whole LBA range in ascending order with a large
//! sector-aligned buffer; a run is an ordered sequence of passes. Block
//! devices are opened with write-through semantics after their volumes have
//! been dismounted; regular-file targets (disk images) run buffered with
//! byte-exact sizes.

use crate::algorithms::PatternPass;
use crate::crypto::secure_rng::secure_random_bytes;
use crate::drives::raw::{open_device, OpenMode, RawDevice};
use crate::drives::volumes::VolumePreparer;
use crate::io::{round_up, AlignedBuffer, PAGE_SIZE};
use crate::ui::progress::{ProgressSample, ProgressThrottle};
use crate::{CancelToken, EngineError, EngineResult};

/// 128 MiB buffers amortize syscall overhead on single-pass fills.
pub const SINGLE_PASS_BUFFER_SIZE: usize = 128 * 1024 * 1024;

/// Multi-pass schedules (DoD, Gutmann) keep the working set smaller.
pub const MULTI_PASS_BUFFER_SIZE: usize = 32 * 1024 * 1024;

pub type ProgressCallback = Box<dyn FnMut(&ProgressSample) + Send>;

/// Buffer size for a run: the pass-count-dependent default, clamped to the
/// rounded target size so small images do not allocate 128 MiB.
pub(crate) fn buffer_size_for(pass_count: usize, target_size: u64, sector: u64) -> usize {
    let base = if pass_count > 1 {
        MULTI_PASS_BUFFER_SIZE
    } else {
        SINGLE_PASS_BUFFER_SIZE
    };
    let needed = round_up(target_size, sector).max(sector);
    (base as u64).min(needed).max(sector) as usize
}

pub struct OverwritePipeline {
    progress: Option<ProgressCallback>,
    cancel: CancelToken,
}

impl Default for OverwritePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl OverwritePipeline {
    pub fn new() -> Self {
        Self {
            progress: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Dismount hosting volumes, open the target for exclusive write, and
    /// run every pass in order. Returns the total bytes written.
    pub fn run(&mut self, path: &str, passes: &[PatternPass]) -> EngineResult<u64> {
        VolumePreparer::prepare(path)?;
        let mut dev = open_device(path, OpenMode::ExclusiveWrite)?;
        self.run_on_device(dev.as_mut(), passes)
    }

    /// Run the pass sequence on an already-open device.
    pub fn run_on_device(
        &mut self,
        dev: &mut dyn RawDevice,
        passes: &[PatternPass],
    ) -> EngineResult<u64> {
        let size = dev.size();
        let sector = dev.sector_size();
        let buffer_size = buffer_size_for(passes.len(), size, sector);
        let mut buffer = AlignedBuffer::new(buffer_size, PAGE_SIZE)?;
        let mut throttle = ProgressThrottle::new();
        let mut total_written = 0u64;

        for (index, pass) in passes.iter().enumerate() {
            let written = self.run_pass(
                dev,
                &mut buffer,
                pass,
                index + 1,
                passes.len(),
                &mut throttle,
            )?;
            total_written += written;
            dev.flush()?;
        }

        Ok(total_written)
    }

    fn run_pass(
        &mut self,
        dev: &mut dyn RawDevice,
        buffer: &mut AlignedBuffer,
        pass: &PatternPass,
        pass_index: usize,
        pass_count: usize,
        throttle: &mut ProgressThrottle,
    ) -> EngineResult<u64> {
        let size = dev.size();
        let sector = dev.sector_size();
        throttle.begin_pass();

        if !pass.randomize {
            buffer.fill(pass.pattern);
        }

        let mut written = 0u64;
        while written < size {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            // Random passes get fresh randomness on every buffer refill,
            // never once per pass.
            if pass.randomize {
                secure_random_bytes(buffer.as_mut_slice())
                    .map_err(|e| EngineError::CommandFailed(e.to_string()))?;
            }

            let remaining = size - written;
            let to_write = round_up(remaining.min(buffer.size() as u64), sector);

            match dev.write_at(&buffer.as_slice()[..to_write as usize], written) {
                Ok(0) => {
                    return Err(EngineError::CommandFailed(format!(
                        "zero-length write at offset {}",
                        written
                    )));
                }
                // Partial writes are tolerated; the next iteration resumes
                // at the actual offset.
                Ok(n) => written += n as u64,
                Err(e) => {
                    // The final write may be rounded up to one sector past
                    // the declared length; a device that errors there has
                    // still absorbed every declared byte.
                    if dev.is_block_device() && written + to_write > size {
                        written = size;
                    } else {
                        return Err(e);
                    }
                }
            }

            self.emit(throttle, written.min(size), size, pass_index, pass_count, false);
        }

        self.emit(throttle, size, size, pass_index, pass_count, true);
        Ok(written.max(size))
    }

    /// Random overwrite of an arbitrary region, used by Destroy for the
    /// partition-structure areas. `offset` is aligned down and `length`
    /// rounded up to the sector size.
    pub fn overwrite_region(
        &mut self,
        dev: &mut dyn RawDevice,
        offset: u64,
        length: u64,
    ) -> EngineResult<u64> {
        let sector = dev.sector_size();
        let start = offset - offset % sector;
        let end = round_up(offset + length, sector);

        let buffer_size = (MULTI_PASS_BUFFER_SIZE as u64).min(end - start).max(sector) as usize;
        let mut buffer = AlignedBuffer::new(buffer_size, PAGE_SIZE)?;

        let mut written = 0u64;
        let total = end - start;
        while written < total {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            secure_random_bytes(buffer.as_mut_slice())
                .map_err(|e| EngineError::CommandFailed(e.to_string()))?;

            let to_write = (total - written).min(buffer.size() as u64);
            match dev.write_at(&buffer.as_slice()[..to_write as usize], start + written) {
                Ok(0) => {
                    return Err(EngineError::CommandFailed(format!(
                        "zero-length write at offset {}",
                        start + written
                    )));
                }
                Ok(n) => written += n as u64,
                Err(e) => return Err(e),
            }
        }

        dev.flush()?;
        Ok(written)
    }

    fn emit(
        &mut self,
        throttle: &mut ProgressThrottle,
        bytes_written: u64,
        total_bytes: u64,
        pass_index: usize,
        pass_count: usize,
        force: bool,
    ) {
        if let Some(ref mut callback) = self.progress {
            if let Some(sample) =
                throttle.sample(bytes_written, total_bytes, pass_index, pass_count, force)
            {
                callback(&sample);
            }
        }
    }
}
