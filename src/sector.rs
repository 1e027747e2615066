//! Fixed-size sector I/O.
//!
//! Every read on a DVD-Video medium is done in units of 2048-byte logical
//! blocks. A title set's `VTS_nn_1.VOB` .. `VTS_nn_9.VOB` files form a single
//! block address space; that is the space cell and NAV addresses refer to.
use crate::catalog::find_entry;
use crate::error::{DvdError, Result};
use log::debug;
use std::{
    fmt::Debug,
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};

/// Size of a logical block (pack) in bytes.
pub const SECTOR_SIZE: usize = 2048;

/// One logical block.
#[derive(Clone)]
pub struct Sector(Box<[u8; SECTOR_SIZE]>);

impl Sector {
    pub fn zeroed() -> Self {
        Sector(Box::new([0u8; SECTOR_SIZE]))
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        &self.0
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8; SECTOR_SIZE] {
        &mut self.0
    }

    /// Returns the bytes from `offset` to the end of the sector, or an empty
    /// slice if `offset` is past the end.
    pub fn tail(&self, offset: usize) -> &[u8] {
        self.0.get(offset..).unwrap_or(&[])
    }
}

impl Default for Sector {
    fn default() -> Self {
        Sector::zeroed()
    }
}

impl Debug for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sector")
            .field("head", &&self.0[..16])
            .finish()
    }
}

/// A blocking source of logical blocks addressed by block number.
pub trait SectorSource {
    /// Reads `buf.len() / SECTOR_SIZE` consecutive blocks starting at `lba`.
    ///
    /// `buf.len()` must be a multiple of [`SECTOR_SIZE`]. Any short read is an
    /// error; there are no partial results.
    ///
    /// [`SECTOR_SIZE`]: constant.SECTOR_SIZE.html
    fn read_sectors(&mut self, lba: u32, buf: &mut [u8]) -> Result<()>;

    /// Number of addressable blocks.
    fn sector_count(&self) -> u32;

    fn read_sector(&mut self, lba: u32, sector: &mut Sector) -> Result<()> {
        self.read_sectors(lba, sector.as_mut_bytes())
    }
}

impl<S: SectorSource + ?Sized> SectorSource for &mut S {
    fn read_sectors(&mut self, lba: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_sectors(lba, buf)
    }

    fn sector_count(&self) -> u32 {
        (**self).sector_count()
    }
}

struct Part<R> {
    reader: R,
    first: u32,
    sectors: u32,
}

/// A block space spanning one or more readers laid out back to back.
///
/// For a title set these are the title VOB files; for an image or an
/// in-memory buffer there is a single part.
pub struct VobSet<R = File> {
    parts: Vec<Part<R>>,
    sectors: u32,
}

impl VobSet<File> {
    /// Opens the title VOBs (`VTS_nn_1.VOB` onwards) of title set `vtsn` in
    /// `video_ts`. Numbering stops at the first missing file.
    pub fn open_title_set(video_ts: &Path, vtsn: u8) -> Result<Self> {
        let mut files = Vec::new();
        for part in 1..=9u8 {
            let name = format!("VTS_{:02}_{}.VOB", vtsn, part);
            match find_entry(video_ts, &name)? {
                Some(path) => {
                    debug!("opening {}", path.display());
                    files.push(File::open(&path)?);
                }
                None => break,
            }
        }
        if files.is_empty() {
            return Err(DvdError::structure(
                format!("title set {}", vtsn),
                "no title VOB files found",
            ));
        }
        VobSet::from_readers(files)
    }
}

impl<R: Read + Seek> VobSet<R> {
    /// Builds a block space from a single reader, e.g. a disc image or a
    /// `Cursor<Vec<u8>>`.
    pub fn from_reader(reader: R) -> Result<Self> {
        VobSet::from_readers(vec![reader])
    }

    /// Builds a block space from readers in address order. Trailing bytes that
    /// do not make up a whole block are ignored.
    pub fn from_readers(readers: Vec<R>) -> Result<Self> {
        let mut parts = Vec::with_capacity(readers.len());
        let mut first = 0u32;
        for mut reader in readers {
            let len = reader.seek(SeekFrom::End(0))?;
            let sectors = (len / SECTOR_SIZE as u64) as u32;
            parts.push(Part {
                reader,
                first,
                sectors,
            });
            first = first.saturating_add(sectors);
        }
        Ok(VobSet {
            parts,
            sectors: first,
        })
    }

    fn read_part(part: &mut Part<R>, lba: u32, buf: &mut [u8]) -> io::Result<()> {
        let offset = u64::from(lba - part.first) * SECTOR_SIZE as u64;
        part.reader.seek(SeekFrom::Start(offset))?;
        part.reader.read_exact(buf)
    }
}

impl<R: Read + Seek> SectorSource for VobSet<R> {
    fn read_sectors(&mut self, lba: u32, buf: &mut [u8]) -> Result<()> {
        let count = (buf.len() / SECTOR_SIZE) as u32;
        let fail = |source: io::Error| DvdError::SectorRead { lba, count, source };

        if buf.len() % SECTOR_SIZE != 0 {
            return Err(fail(io::Error::new(
                io::ErrorKind::InvalidInput,
                "buffer is not a whole number of sectors",
            )));
        }
        if u64::from(lba) + u64::from(count) > u64::from(self.sectors) {
            return Err(fail(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past the end of the medium",
            )));
        }

        let mut cur = lba;
        let mut rest = buf;
        while !rest.is_empty() {
            let part = self
                .parts
                .iter_mut()
                .find(|p| cur >= p.first && cur < p.first + p.sectors)
                .ok_or_else(|| fail(io::ErrorKind::UnexpectedEof.into()))?;
            let available = (part.first + part.sectors - cur) as usize;
            let take = available.min(rest.len() / SECTOR_SIZE);
            let (head, tail) = rest.split_at_mut(take * SECTOR_SIZE);
            Self::read_part(part, cur, head).map_err(fail)?;
            cur += take as u32;
            rest = tail;
        }
        Ok(())
    }

    fn sector_count(&self) -> u32 {
        self.sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn numbered(first: u32, n: u32) -> Cursor<Vec<u8>> {
        let mut v = Vec::new();
        for lba in first..first + n {
            let mut s = [0u8; SECTOR_SIZE];
            s[..4].copy_from_slice(&lba.to_be_bytes());
            v.extend_from_slice(&s);
        }
        Cursor::new(v)
    }

    #[test]
    fn reads_across_parts() {
        let mut set = VobSet::from_readers(vec![numbered(0, 3), numbered(3, 2)]).unwrap();
        assert_eq!(set.sector_count(), 5);

        let mut buf = vec![0u8; 3 * SECTOR_SIZE];
        set.read_sectors(2, &mut buf).unwrap();
        for (i, chunk) in buf.chunks(SECTOR_SIZE).enumerate() {
            assert_eq!(&chunk[..4], &(2 + i as u32).to_be_bytes());
        }
    }

    #[test]
    fn read_past_end() {
        let mut set = VobSet::from_reader(numbered(0, 2)).unwrap();
        let mut s = Sector::zeroed();
        match set.read_sector(2, &mut s) {
            Err(DvdError::SectorRead { lba: 2, count: 1, .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn partial_trailing_block_ignored() {
        let mut v = numbered(0, 1).into_inner();
        v.extend_from_slice(&[0u8; 100]);
        let set = VobSet::from_reader(Cursor::new(v)).unwrap();
        assert_eq!(set.sector_count(), 1);
    }
}
