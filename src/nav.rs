//! NAV pack parsing and the angle-aware VOBU walker.
//!
//! A program chain's cells are walked one Video Object Unit at a time. Every
//! VOBU starts with a NAV pack whose DSI packet gives the VOBU's own address,
//! the number of sectors that follow it, and the link to the next VOBU in the
//! cell. The walker trusts those links as long as the DSI agrees with the
//! sector it was read from; when it does not, it scans forward for the next
//! NAV pack.
use crate::error::{DvdError, Result};
use crate::parser::{self, DSI_START_BYTE};
use crate::sector::{Sector, SectorSource};
use crate::types::{BlockType, DvdTime, ProgramChain};
use log::{debug, warn};

/// `forward_link` value marking the last VOBU of a cell.
pub const SRI_END_OF_CELL: u32 = 0x3FFF_FFFF;

/// Upper bound on a VOBU's trailing sector count.
pub const MAX_VOBU_EXTRA_SECTORS: u32 = 1024;

/// An entry of the DSI's per-angle address table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AngleLink {
    pub address: u32,
    pub size: u16,
}

/// Data Search Information of one NAV pack.
#[derive(Debug, Clone)]
pub struct Dsi {
    pub scr: u32,
    /// Logical block number of the NAV pack itself.
    pub self_address: u32,
    /// Number of sectors following the NAV pack in this VOBU.
    pub extra_sectors: u32,
    pub vob_id: u16,
    pub cell_id: u8,
    pub cell_elapsed: DvdTime,
    pub angles: Vec<AngleLink>,
    pub next_video: u32,
    /// Offset of the next VOBU relative to this one, or [`SRI_END_OF_CELL`].
    ///
    /// [`SRI_END_OF_CELL`]: constant.SRI_END_OF_CELL.html
    pub forward_link: u32,
}

impl Dsi {
    pub fn parse(sector: &Sector) -> Result<Dsi> {
        parser::dsi(sector.tail(DSI_START_BYTE))
            .map(|(_, d)| d)
            .map_err(|_| DvdError::structure("NAV pack", "truncated DSI packet"))
    }

    pub fn is_end_of_cell(&self) -> bool {
        self.forward_link == SRI_END_OF_CELL
    }
}

/// How NAV packs are recognized.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NavCheck {
    /// Only the PCI and DSI stream ids at bytes 41 and 1027. This is what
    /// existing tools use, and it decides which sectors count as VOBU starts.
    TwoPoint,
    /// Additionally requires the pack start code, both PES start codes and
    /// the PCI/DSI sub-stream ids.
    Strict,
}

impl Default for NavCheck {
    fn default() -> Self {
        NavCheck::TwoPoint
    }
}

/// Returns whether `sector` looks like a NAV pack.
pub fn is_nav_pack(sector: &Sector, check: NavCheck) -> bool {
    let b = sector.as_bytes();
    let two_point = b[41] == 0xBF && b[1027] == 0xBF;
    match check {
        NavCheck::TwoPoint => two_point,
        NavCheck::Strict => {
            two_point
                && b[0..4] == [0x00, 0x00, 0x01, 0xBA]
                && b[38..41] == [0x00, 0x00, 0x01]
                && b[44] == 0x00
                && b[1024..1027] == [0x00, 0x00, 0x01]
                && b[1030] == 0x01
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct NavOptions {
    pub check: NavCheck,
    /// How many sectors to scan past a desynchronized NAV pack before giving
    /// up on the rest of the cell.
    pub rescan_limit: u32,
}

impl Default for NavOptions {
    fn default() -> Self {
        NavOptions {
            check: NavCheck::default(),
            rescan_limit: MAX_VOBU_EXTRA_SECTORS,
        }
    }
}

/// A run of sectors to emit: one NAV pack and the VOBU data behind it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VobuSpan {
    /// 0-based index of the cell the VOBU belongs to.
    pub cell: usize,
    pub first_sector: u32,
    pub sector_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub vobus: u64,
    pub sectors: u64,
    pub desyncs: u64,
    /// Cells entered, in order, as 0-based indexes into their program chain.
    pub cells: Vec<usize>,
}

impl TraversalStats {
    /// Adds the counters of a later traversal to these.
    pub fn append(&mut self, other: TraversalStats) {
        self.vobus += other.vobus;
        self.sectors += other.sectors;
        self.desyncs += other.desyncs;
        self.cells.extend(other.cells);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    SeekCell,
    ReadNavPack { cell: usize, pack: u32 },
    Done,
}

/// A single pass over the VOBUs of a cell range.
///
/// Call [`next_span`] until it returns `Ok(None)`. The traversal borrows the
/// program chain but not the sector source, so the caller can read the
/// returned spans from the same source in between.
///
/// [`next_span`]: #method.next_span
#[derive(Debug)]
pub struct Traversal<'pgc> {
    pgc: &'pgc ProgramChain,
    end_cell: usize,
    angle: usize,
    options: NavOptions,
    next_cell: usize,
    state: State,
    sector: Sector,
    stats: TraversalStats,
}

impl<'pgc> Traversal<'pgc> {
    /// Prepares a walk over cells `start_cell..=end_cell` (0-based) taking
    /// `angle` (0-based) inside angle blocks.
    pub fn new(
        pgc: &'pgc ProgramChain,
        start_cell: usize,
        end_cell: usize,
        angle: u8,
        options: NavOptions,
    ) -> Result<Self> {
        if start_cell > end_cell || end_cell >= pgc.cells.len() {
            return Err(DvdError::structure(
                "PGC",
                format!(
                    "cell range {}..={} outside {} cells",
                    start_cell,
                    end_cell,
                    pgc.cells.len()
                ),
            ));
        }
        Ok(Traversal {
            pgc,
            end_cell,
            angle: angle as usize,
            options,
            next_cell: start_cell,
            state: State::SeekCell,
            sector: Sector::zeroed(),
            stats: TraversalStats::default(),
        })
    }

    pub fn stats(&self) -> &TraversalStats {
        &self.stats
    }

    pub fn into_stats(self) -> TraversalStats {
        self.stats
    }

    /// Advances to the next VOBU and returns the sectors to emit for it.
    pub fn next_span<S: SectorSource + ?Sized>(&mut self, source: &mut S) -> Result<Option<VobuSpan>> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::SeekCell => self.seek_cell()?,
                State::ReadNavPack { cell, pack } => {
                    if let Some(span) = self.read_nav_pack(source, cell, pack)? {
                        self.stats.vobus += 1;
                        self.stats.sectors += u64::from(span.sector_count);
                        return Ok(Some(span));
                    }
                }
            }
        }
    }

    fn seek_cell(&mut self) -> Result<()> {
        let pgc = self.pgc;
        let cells = &pgc.cells;
        if self.next_cell > self.end_cell || self.next_cell >= cells.len() {
            self.state = State::Done;
            return Ok(());
        }

        let mut cur = self.next_cell;
        if cells[cur].block_type == BlockType::Angle {
            let (first, last) = pgc.angle_block(cur);
            let last = match last {
                Some(i) => i,
                None => {
                    warn!("angle block at cell {} has no last cell", first + 1);
                    cells.len() - 1
                }
            };
            if first + self.angle > last {
                return Err(DvdError::structure(
                    "PGC",
                    format!(
                        "angle block at cell {} has no cell for angle {}",
                        first + 1,
                        self.angle + 1
                    ),
                ));
            }
            let chosen = first + self.angle;
            self.next_cell = last + 1;
            if chosen < cur || chosen > self.end_cell {
                // the range only covers other angles of this block
                debug!(
                    "cell {} for angle {} lies outside cells {}..={}",
                    chosen + 1,
                    self.angle + 1,
                    cur + 1,
                    self.end_cell + 1
                );
                return Ok(());
            }
            cur = chosen;
        } else {
            self.next_cell = cur + 1;
        }

        let cell = &cells[cur];
        if cell.first_sector > cell.last_sector {
            warn!(
                "cell {} has inverted sector range {}..{}, skipping",
                cur + 1,
                cell.first_sector,
                cell.last_sector
            );
            return Ok(());
        }

        debug!(
            "entering cell {} (sectors {}..={})",
            cur + 1,
            cell.first_sector,
            cell.last_sector
        );
        self.stats.cells.push(cur);
        self.state = State::ReadNavPack {
            cell: cur,
            pack: cell.first_sector,
        };
        Ok(())
    }

    fn read_nav_pack<S: SectorSource + ?Sized>(
        &mut self,
        source: &mut S,
        cell: usize,
        pack: u32,
    ) -> Result<Option<VobuSpan>> {
        let last_sector = self.pgc.cells[cell].last_sector;
        if pack > last_sector {
            self.state = State::SeekCell;
            return Ok(None);
        }

        source.read_sector(pack, &mut self.sector)?;
        if !is_nav_pack(&self.sector, self.options.check) {
            warn!("no NAV pack at sector {} in cell {}", pack, cell + 1);
            self.stats.desyncs += 1;
            return self.rescan(source, cell, pack);
        }

        let dsi = Dsi::parse(&self.sector)?;
        if dsi.self_address != pack {
            warn!(
                "NAV pack at sector {} claims address {}, resynchronizing",
                pack, dsi.self_address
            );
            self.stats.desyncs += 1;
            return self.rescan(source, cell, pack);
        }
        if dsi.extra_sectors >= MAX_VOBU_EXTRA_SECTORS {
            warn!(
                "NAV pack at sector {} has implausible VOBU size {}, resynchronizing",
                pack, dsi.extra_sectors
            );
            self.stats.desyncs += 1;
            return self.rescan(source, cell, pack);
        }

        let end_of_vobu = pack.checked_add(dsi.extra_sectors + 1);
        let next = if dsi.is_end_of_cell() {
            end_of_vobu
        } else {
            pack.checked_add(dsi.forward_link & 0x7FFF_FFFF)
                .filter(|&link| link > pack)
                .or(end_of_vobu)
        };

        // past the end of the block space there is nothing left of the cell
        self.state = match next {
            Some(pack) => State::ReadNavPack { cell, pack },
            None => State::SeekCell,
        };
        Ok(Some(VobuSpan {
            cell,
            first_sector: pack,
            sector_count: dsi.extra_sectors + 1,
        }))
    }

    // Looks for the next NAV pack after `pack`, without leaving the cell.
    fn rescan<S: SectorSource + ?Sized>(
        &mut self,
        source: &mut S,
        cell: usize,
        pack: u32,
    ) -> Result<Option<VobuSpan>> {
        let last_sector = self.pgc.cells[cell].last_sector;
        let limit = pack
            .saturating_add(self.options.rescan_limit)
            .min(last_sector);

        if let Some(start) = pack.checked_add(1) {
            for cur in start..=limit {
                source.read_sector(cur, &mut self.sector)?;
                if is_nav_pack(&self.sector, self.options.check) {
                    debug!("resynchronized at sector {}", cur);
                    self.state = State::ReadNavPack { cell, pack: cur };
                    return Ok(None);
                }
            }
        }

        warn!(
            "no NAV pack within {} sectors after {}, leaving cell {}",
            limit - pack,
            pack,
            cell + 1
        );
        self.state = State::SeekCell;
        Ok(None)
    }
}
