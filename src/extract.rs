//! Writing sectors to a sink, and the bulk range extractor.
use crate::error::{DvdError, Result};
use crate::sector::{SectorSource, SECTOR_SIZE};
use crate::types::{CellRange, ProgramChain};
use log::debug;
use std::io::Write;

/// Default number of sectors read and written per batch.
pub const DEFAULT_BATCH_SECTORS: u32 = 512;

/// Copies `count` sectors starting at `first` verbatim to `sink`, `batch`
/// sectors at a time. Returns the number of bytes written.
pub fn copy_sectors<S, W>(
    source: &mut S,
    first: u32,
    count: u32,
    sink: &mut W,
    batch: u32,
) -> Result<u64>
where
    S: SectorSource + ?Sized,
    W: Write + ?Sized,
{
    let batch = batch.max(1);
    let mut buf = vec![0u8; batch.min(count) as usize * SECTOR_SIZE];
    let mut written = 0u64;
    let mut lba = first;
    let mut remaining = count;

    while remaining > 0 {
        let n = remaining.min(batch);
        let chunk = &mut buf[..n as usize * SECTOR_SIZE];
        source.read_sectors(lba, chunk)?;
        sink.write_all(chunk).map_err(DvdError::Write)?;
        written += chunk.len() as u64;
        lba += n;
        remaining -= n;
    }
    Ok(written)
}

/// The absolute sector interval a cell range covers.
pub fn range_sectors(pgc: &ProgramChain, range: &CellRange) -> Result<(u32, u32)> {
    let start = pgc.cells.get(range.start_cell);
    let end = pgc.cells.get(range.end_cell);
    match (start, end) {
        (Some(s), Some(e)) if s.first_sector <= e.last_sector => {
            Ok((s.first_sector, e.last_sector))
        }
        (Some(s), Some(e)) => Err(DvdError::structure(
            format!("PGC {}", range.pgcn),
            format!(
                "cells {}-{} span inverted sectors {}..{}",
                range.start_cell + 1,
                range.end_cell + 1,
                s.first_sector,
                e.last_sector
            ),
        )),
        _ => Err(DvdError::structure(
            format!("PGC {}", range.pgcn),
            format!(
                "cells {}-{} outside {} cells",
                range.start_cell + 1,
                range.end_cell + 1,
                pgc.cells.len()
            ),
        )),
    }
}

/// Dumps every sector from the first cell's first sector to the last cell's
/// last sector, without looking at NAV packs.
///
/// This ignores angle blocks: on a multi-angle title the output interleaves
/// all angles.
pub fn extract_range<S, W>(
    source: &mut S,
    pgc: &ProgramChain,
    range: &CellRange,
    sink: &mut W,
    batch: u32,
) -> Result<u64>
where
    S: SectorSource + ?Sized,
    W: Write + ?Sized,
{
    let (first, last) = range_sectors(pgc, range)?;
    let count = u64::from(last) - u64::from(first) + 1;
    if u64::from(first) + count > u64::from(source.sector_count()) {
        return Err(DvdError::structure(
            format!("PGC {}", range.pgcn),
            format!(
                "sectors {}..={} run past the {} sectors of the title VOBs",
                first,
                last,
                source.sector_count()
            ),
        ));
    }
    debug!("bulk copy of sectors {}..={}", first, last);
    copy_sectors(source, first, count as u32, sink, batch)
}
