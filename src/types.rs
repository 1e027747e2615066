use crate::bits;
use crate::error::{DvdError, IndexKind, Result};
use std::{collections::BTreeMap, fmt::Debug, time::Duration};

/// The disc catalog: the volume-level title table and the title sets that
/// were loaded for it.
///
/// A catalog is produced once by [`Catalog::load`] (or
/// [`Catalog::load_for_title`]) and is read-only afterwards.
///
/// [`Catalog::load`]: #method.load
/// [`Catalog::load_for_title`]: #method.load_for_title
#[derive(Debug, Clone)]
pub struct Catalog {
    pub volume: VolumeInfo,
    pub titles: Vec<Title>,
    pub(crate) title_sets: BTreeMap<u8, TitleSet>,
}

#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub version: u16,
    pub category: u32,
    pub volume_count: u16,
    pub volume_number: u16,
    pub side: u8,
    pub title_set_count: u16,
    pub provider_id: String,
}

/// A title from the volume-level title search pointer table.
#[derive(Debug, Copy, Clone)]
pub struct Title {
    /// 1-based title number on the disc.
    pub number: u16,
    pub playback_type: u8,
    pub angle_count: u8,
    pub chapter_count: u16,
    pub parental_mask: u16,
    /// The title set (VTSN) holding this title's program chains.
    pub title_set: u8,
    /// The title's number within its title set (VTS_TTN).
    pub title_set_title: u8,
    pub title_set_sector: u32,
}

impl Title {
    /// Number of selectable angles, never less than one.
    pub fn angles(&self) -> u8 {
        self.angle_count.max(1)
    }
}

/// A chapter (part of title) entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// 1-based program chain number within the title set.
    pub pgcn: u16,
    /// 1-based program number within that program chain.
    pub pgn: u16,
}

#[derive(Debug, Clone)]
pub struct TitleSet {
    pub number: u8,
    pub last_sector: u32,
    pub version: u16,
    pub category: u32,
    /// Chapter tables, indexed by VTS_TTN - 1.
    pub chapters: Vec<Vec<Chapter>>,
    pub program_chains: Vec<ProgramChain>,
    pub video: VideoAttributes,
    pub audio: Vec<AudioAttributes>,
    pub subpictures: Vec<SubpictureAttributes>,
}

impl TitleSet {
    /// Looks up a program chain by its 1-based number.
    pub fn program_chain(&self, pgcn: u16) -> Option<&ProgramChain> {
        (pgcn as usize)
            .checked_sub(1)
            .and_then(|i| self.program_chains.get(i))
    }
}

#[derive(Debug, Clone)]
pub struct ProgramChain {
    pub is_entry: bool,
    pub title_number: u8,
    pub playback_time: DvdTime,
    pub prohibited_ops: u32,
    pub next_pgcn: u16,
    pub prev_pgcn: u16,
    pub goup_pgcn: u16,
    pub still_time: u8,
    pub playback_mode: u8,
    /// 1-based starting cell number of each program.
    pub program_map: Vec<u8>,
    pub cells: Vec<Cell>,
    pub cell_positions: Vec<CellPosition>,
}

impl ProgramChain {
    /// The 0-based first and last cells of the angle block holding `cell`.
    ///
    /// The first cell is the nearest preceding "first cell" entry of the
    /// block, or the earliest adjacent angle cell when that entry is missing.
    /// The last cell is `None` when no "last cell" entry follows.
    pub fn angle_block(&self, cell: usize) -> (usize, Option<usize>) {
        let cells = &self.cells;
        let mut first = cell;
        while cells[first].block_mode != BlockMode::FirstCell
            && first > 0
            && cells[first - 1].block_type == BlockType::Angle
            && cells[first - 1].block_mode != BlockMode::LastCell
        {
            first -= 1;
        }
        let last = (cell..cells.len()).find(|&i| cells[i].block_mode == BlockMode::LastCell);
        (first, last)
    }

    /// Returns the 0-based index of the first cell of program `pgn`.
    pub fn program_start_cell(&self, pgn: u16) -> Option<usize> {
        let entry = (pgn as usize)
            .checked_sub(1)
            .and_then(|i| self.program_map.get(i))?;
        let cell = (*entry as usize).checked_sub(1)?;
        if cell < self.cells.len() {
            Some(cell)
        } else {
            None
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockMode {
    NotInBlock,
    FirstCell,
    InBlock,
    LastCell,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockType {
    Normal,
    Angle,
    Unknown(u8),
}

/// A cell playback entry.
#[derive(Debug, Copy, Clone)]
pub struct Cell {
    pub block_mode: BlockMode,
    pub block_type: BlockType,
    pub seamless_play: bool,
    pub interleaved: bool,
    pub stc_discontinuity: bool,
    pub seamless_angle: bool,
    pub still_time: u8,
    pub command_number: u8,
    pub playback_time: DvdTime,
    pub first_sector: u32,
    pub first_ilvu_end_sector: u32,
    pub last_vobu_start_sector: u32,
    pub last_sector: u32,
}

impl Cell {
    pub fn sector_count(&self) -> u32 {
        self.last_sector.saturating_sub(self.first_sector) + 1
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CellPosition {
    pub vob_id: u16,
    pub cell_id: u8,
}

/// A run of cells within one program chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CellRange {
    pub pgcn: u16,
    /// 0-based index of the first cell.
    pub start_cell: usize,
    /// 0-based index of the last cell, inclusive.
    pub end_cell: usize,
}

/// Packed video attributes of a title set.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct VideoAttributes(pub [u8; 2]);

/// Packed attributes of one audio stream.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct AudioAttributes(pub [u8; 8]);

/// Packed attributes of one subpicture stream.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SubpictureAttributes(pub [u8; 6]);

/// A BCD-coded playback time, as found in program chains, cells and DSI packets.
///
/// The frame byte carries the frame rate in its two top bits (`01` = 25 fps,
/// `11` = 29.97 fps) and the BCD frame count in the low six.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct DvdTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub frame_u: u8,
}

impl DvdTime {
    /// Frames per second, if the rate selector holds a defined value.
    pub fn fps(&self) -> Option<f64> {
        match bits::field(self.frame_u, 6, 2) {
            0b01 => Some(25.0),
            0b11 => Some(29.97),
            _ => None,
        }
    }

    pub fn frames(&self) -> u32 {
        bits::bcd(self.frame_u & 0x3F)
    }

    /// The time in whole milliseconds; the frame part is rounded to the
    /// nearest millisecond.
    pub fn millis(&self) -> u64 {
        let hms = u64::from(bits::bcd(self.hour)) * 3_600_000
            + u64::from(bits::bcd(self.minute)) * 60_000
            + u64::from(bits::bcd(self.second)) * 1_000;
        let frames = match self.fps() {
            Some(fps) => (f64::from(self.frames()) * 1_000.0 / fps).round() as u64,
            None => 0,
        };
        hms + frames
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.millis())
    }
}

impl Debug for DvdTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DvdTime")
            .field(
                "hms",
                &format_args!("{:02x}:{:02x}:{:02x}", self.hour, self.minute, self.second),
            )
            .field("frames", &self.frames())
            .field("ms", &self.millis())
            .finish()
    }
}

impl Catalog {
    pub fn title_count(&self) -> u16 {
        self.titles.len() as u16
    }

    /// Looks up a title by its 1-based number.
    pub fn title(&self, title: u16) -> Result<&Title> {
        (title as usize)
            .checked_sub(1)
            .and_then(|i| self.titles.get(i))
            .ok_or(DvdError::IndexOutOfRange {
                kind: IndexKind::Title,
                value: u32::from(title),
                max: self.titles.len() as u32,
            })
    }

    /// The loaded title set with number `vtsn`.
    pub fn title_set(&self, vtsn: u8) -> Result<&TitleSet> {
        self.title_sets
            .get(&vtsn)
            .ok_or_else(|| DvdError::structure(format!("VTS_{:02}_0.IFO", vtsn), "title set not loaded"))
    }

    /// The title set owning `title`, together with the title's chapter table.
    pub fn title_chapters(&self, title: u16) -> Result<(&Title, &TitleSet, &[Chapter])> {
        let t = self.title(title)?;
        let ts = self.title_set(t.title_set)?;
        let chapters = (t.title_set_title as usize)
            .checked_sub(1)
            .and_then(|i| ts.chapters.get(i))
            .ok_or_else(|| {
                DvdError::structure(
                    format!("VTS_{:02}_0.IFO", t.title_set),
                    format!("no chapter table for title {}", t.title_set_title),
                )
            })?;
        let n = chapters.len().min(t.chapter_count as usize);
        Ok((t, ts, &chapters[..n]))
    }

    /// Number of chapters actually addressable in `title`.
    pub fn chapter_count(&self, title: u16) -> Result<u16> {
        self.title_chapters(title).map(|(_, _, c)| c.len() as u16)
    }

    /// Looks up one chapter by 1-based title and chapter numbers.
    pub fn chapter(&self, title: u16, chapter: u16) -> Result<Chapter> {
        let (_, _, chapters) = self.title_chapters(title)?;
        chapter_at(chapters, chapter).copied()
    }

    /// Checks that the 0-based `angle` exists in `title`.
    pub fn check_angle(&self, title: u16, angle: u8) -> Result<()> {
        let t = self.title(title)?;
        if angle < t.angles() {
            Ok(())
        } else {
            Err(DvdError::IndexOutOfRange {
                kind: IndexKind::Angle,
                value: u32::from(angle) + 1,
                max: u32::from(t.angles()),
            })
        }
    }

    /// Resolves the inclusive chapter range `first..=last` of `title` to the
    /// cells it covers, one range per run of consecutive chapters sharing a
    /// program chain, in playback order.
    ///
    /// A run starts at the first cell of its first chapter's program. It ends
    /// at the program chain's last cell when the run's last chapter is the
    /// title's final chapter or the next chapter lives in another program
    /// chain, and at the cell before the next chapter's first cell otherwise.
    pub fn chapter_ranges(&self, title: u16, first: u16, last: u16) -> Result<Vec<CellRange>> {
        let (t, ts, chapters) = self.title_chapters(title)?;
        let what = || format!("VTS_{:02}_0.IFO", t.title_set);

        chapter_at(chapters, first)?;
        chapter_at(chapters, last)?;
        if last < first {
            return Err(DvdError::IndexOutOfRange {
                kind: IndexKind::Chapter,
                value: u32::from(last),
                max: chapters.len() as u32,
            });
        }

        let mut ranges = Vec::new();
        // 0-based chapter indexes
        let (mut run, end) = (first as usize - 1, last as usize - 1);
        while run <= end {
            let pgcn = chapters[run].pgcn;
            let mut run_end = run;
            while run_end < end && chapters[run_end + 1].pgcn == pgcn {
                run_end += 1;
            }

            let (pgc, start_cell) = chapter_start(ts, chapters, run)?;
            let last_cell = pgc.cells.len() - 1;
            let end_cell = match chapters.get(run_end + 1) {
                Some(next) if next.pgcn == pgcn => {
                    let (_, next_start) = chapter_start(ts, chapters, run_end + 1)?;
                    next_start.saturating_sub(1).min(last_cell)
                }
                _ => last_cell,
            };
            if end_cell < start_cell {
                return Err(DvdError::structure(
                    what(),
                    format!(
                        "chapters {}-{} resolve to an empty cell range",
                        run + 1,
                        run_end + 1
                    ),
                ));
            }

            ranges.push(CellRange {
                pgcn,
                start_cell,
                end_cell,
            });
            run = run_end + 1;
        }
        Ok(ranges)
    }

    /// The program chain a resolved cell range refers to.
    pub fn program_chain(&self, title: u16, pgcn: u16) -> Result<&ProgramChain> {
        let t = self.title(title)?;
        self.title_set(t.title_set)?
            .program_chain(pgcn)
            .ok_or_else(|| DvdError::structure(format!("VTS_{:02}_0.IFO", t.title_set), format!("no PGC {}", pgcn)))
    }
}

// Program chain and 0-based first cell of the chapter at index `ch`.
fn chapter_start<'a>(ts: &'a TitleSet, chapters: &[Chapter], ch: usize) -> Result<(&'a ProgramChain, usize)> {
    let what = || format!("VTS_{:02}_0.IFO", ts.number);
    let c = chapters[ch];
    let pgc = ts.program_chain(c.pgcn).ok_or_else(|| {
        DvdError::structure(what(), format!("chapter {} names missing PGC {}", ch + 1, c.pgcn))
    })?;
    let cell = pgc.program_start_cell(c.pgn).ok_or_else(|| {
        DvdError::structure(what(), format!("PGC {} has no program {}", c.pgcn, c.pgn))
    })?;
    Ok((pgc, cell))
}

fn chapter_at(chapters: &[Chapter], chapter: u16) -> Result<&Chapter> {
    (chapter as usize)
        .checked_sub(1)
        .and_then(|i| chapters.get(i))
        .ok_or(DvdError::IndexOutOfRange {
            kind: IndexKind::Chapter,
            value: u32::from(chapter),
            max: chapters.len() as u32,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_pal() {
        // 01:02:03, 10 frames at 25 fps
        let t = DvdTime {
            hour: 0x01,
            minute: 0x02,
            second: 0x03,
            frame_u: 0x40 | 0x10,
        };
        assert_eq!(t.fps(), Some(25.0));
        assert_eq!(t.frames(), 10);
        assert_eq!(t.millis(), 3_723_000 + 400);
    }

    #[test]
    fn time_ntsc() {
        let t = DvdTime {
            hour: 0,
            minute: 0,
            second: 0x59,
            frame_u: 0xC0 | 0x29,
        };
        assert_eq!(t.frames(), 29);
        // 29 / 29.97 s = 967.6 ms
        assert_eq!(t.millis(), 59_000 + 968);
    }

    #[test]
    fn time_undefined_rate_ignores_frames() {
        let t = DvdTime {
            hour: 0,
            minute: 0x10,
            second: 0,
            frame_u: 0x80 | 0x12,
        };
        assert_eq!(t.fps(), None);
        assert_eq!(t.millis(), 600_000);
    }

    fn cell(block_type: BlockType, block_mode: BlockMode) -> Cell {
        Cell {
            block_mode,
            block_type,
            seamless_play: false,
            interleaved: false,
            stc_discontinuity: false,
            seamless_angle: false,
            still_time: 0,
            command_number: 0,
            playback_time: DvdTime::default(),
            first_sector: 0,
            first_ilvu_end_sector: 0,
            last_vobu_start_sector: 0,
            last_sector: 0,
        }
    }

    fn pgc(cells: Vec<Cell>, program_map: Vec<u8>) -> ProgramChain {
        ProgramChain {
            is_entry: true,
            title_number: 1,
            playback_time: DvdTime::default(),
            prohibited_ops: 0,
            next_pgcn: 0,
            prev_pgcn: 0,
            goup_pgcn: 0,
            still_time: 0,
            playback_mode: 0,
            program_map,
            cells,
            cell_positions: Vec::new(),
        }
    }

    fn normal(n: usize) -> Vec<Cell> {
        vec![cell(BlockType::Normal, BlockMode::NotInBlock); n]
    }

    fn catalog(chapters: Vec<Chapter>, program_chains: Vec<ProgramChain>) -> Catalog {
        let title = Title {
            number: 1,
            playback_type: 0,
            angle_count: 1,
            chapter_count: chapters.len() as u16,
            parental_mask: 0,
            title_set: 1,
            title_set_title: 1,
            title_set_sector: 0,
        };
        let ts = TitleSet {
            number: 1,
            last_sector: 0,
            version: 0,
            category: 0,
            chapters: vec![chapters],
            program_chains,
            video: VideoAttributes::default(),
            audio: Vec::new(),
            subpictures: Vec::new(),
        };
        Catalog {
            volume: VolumeInfo {
                version: 0,
                category: 0,
                volume_count: 1,
                volume_number: 1,
                side: 0,
                title_set_count: 1,
                provider_id: String::new(),
            },
            titles: vec![title],
            title_sets: std::iter::once((1, ts)).collect(),
        }
    }

    #[test]
    fn chapter_ranges_split_at_program_chains() {
        let catalog = catalog(
            vec![
                Chapter { pgcn: 1, pgn: 1 },
                Chapter { pgcn: 1, pgn: 2 },
                Chapter { pgcn: 2, pgn: 1 },
            ],
            vec![pgc(normal(2), vec![1, 2]), pgc(normal(1), vec![1])],
        );

        let all = catalog.chapter_ranges(1, 1, 3).unwrap();
        assert_eq!(
            all,
            vec![
                CellRange {
                    pgcn: 1,
                    start_cell: 0,
                    end_cell: 1
                },
                CellRange {
                    pgcn: 2,
                    start_cell: 0,
                    end_cell: 0
                },
            ]
        );
        assert_eq!(catalog.chapter_ranges(1, 2, 3).unwrap()[0].start_cell, 1);
        assert_eq!(catalog.chapter_ranges(1, 1, 1).unwrap().len(), 1);
        assert_eq!(catalog.chapter_ranges(1, 1, 1).unwrap()[0].end_cell, 0);
        assert_eq!(catalog.chapter_ranges(1, 3, 3).unwrap()[0].pgcn, 2);
    }

    #[test]
    fn angle_block_bounds() {
        let mut cells = normal(6);
        cells[1] = cell(BlockType::Angle, BlockMode::FirstCell);
        cells[2] = cell(BlockType::Angle, BlockMode::InBlock);
        cells[3] = cell(BlockType::Angle, BlockMode::LastCell);
        // a second block right behind the first, without a first-cell entry
        cells[4] = cell(BlockType::Angle, BlockMode::InBlock);
        cells[5] = cell(BlockType::Angle, BlockMode::LastCell);
        let pgc = pgc(cells, vec![1]);

        assert_eq!(pgc.angle_block(1), (1, Some(3)));
        assert_eq!(pgc.angle_block(2), (1, Some(3)));
        assert_eq!(pgc.angle_block(3), (1, Some(3)));
        assert_eq!(pgc.angle_block(5), (4, Some(5)));
    }

    #[test]
    fn program_start_cell_bounds() {
        let pgc = ProgramChain {
            is_entry: true,
            title_number: 1,
            playback_time: DvdTime::default(),
            prohibited_ops: 0,
            next_pgcn: 0,
            prev_pgcn: 0,
            goup_pgcn: 0,
            still_time: 0,
            playback_mode: 0,
            program_map: vec![1, 3, 9],
            cells: vec![
                Cell {
                    block_mode: BlockMode::NotInBlock,
                    block_type: BlockType::Normal,
                    seamless_play: false,
                    interleaved: false,
                    stc_discontinuity: false,
                    seamless_angle: false,
                    still_time: 0,
                    command_number: 0,
                    playback_time: DvdTime::default(),
                    first_sector: 0,
                    first_ilvu_end_sector: 0,
                    last_vobu_start_sector: 0,
                    last_sector: 0,
                };
                4
            ],
            cell_positions: Vec::new(),
        };
        assert_eq!(pgc.program_start_cell(1), Some(0));
        assert_eq!(pgc.program_start_cell(2), Some(2));
        assert_eq!(pgc.program_start_cell(3), None);
        assert_eq!(pgc.program_start_cell(0), None);
    }
}
