//! Builds small synthetic `VIDEO_TS` trees in a temporary directory, and
//! captures log records.
#![allow(dead_code)]

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::{
    cell::RefCell,
    fs::{self, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use tempfile::TempDir;

pub const SECTOR: usize = 2048;
pub const END_OF_CELL: u32 = 0x3FFF_FFFF;
const DSI: usize = 1031;

/// Where a cell sits in an angle block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Block {
    None,
    First,
    Middle,
    Last,
}

#[derive(Debug, Clone)]
pub struct CellSpec {
    pub vobus: u32,
    /// Sectors per VOBU, NAV pack included.
    pub vobu_sectors: u32,
    pub block: Block,
    /// BCD hours, minutes, seconds and rate/frames byte.
    pub time: [u8; 4],
}

impl CellSpec {
    pub fn new(vobus: u32, vobu_sectors: u32) -> Self {
        CellSpec {
            vobus,
            vobu_sectors,
            block: Block::None,
            time: [0, 0, 0, 0],
        }
    }

    pub fn time(mut self, time: [u8; 4]) -> Self {
        self.time = time;
        self
    }

    pub fn block(mut self, block: Block) -> Self {
        self.block = block;
        self
    }
}

/// One program chain of a title.
#[derive(Debug, Clone)]
pub struct PgcSpec {
    pub cells: Vec<CellSpec>,
    /// 1-based first cell of each program; one chapter per program.
    pub programs: Vec<u8>,
    pub time: [u8; 4],
}

impl PgcSpec {
    /// `cells` identical cells, one program per cell.
    pub fn simple(cells: usize, vobus: u32, vobu_sectors: u32) -> Self {
        PgcSpec {
            cells: (0..cells).map(|_| CellSpec::new(vobus, vobu_sectors)).collect(),
            programs: (1..=cells as u8).collect(),
            time: [0, 0, 0, 0],
        }
    }

    pub fn time(mut self, time: [u8; 4]) -> Self {
        self.time = time;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TitleSpec {
    /// Program chains in chapter order.
    pub pgcs: Vec<PgcSpec>,
    pub angles: u8,
}

impl TitleSpec {
    pub fn new(pgc: PgcSpec) -> Self {
        TitleSpec {
            pgcs: vec![pgc],
            angles: 1,
        }
    }

    /// A title of `cells` identical cells, one chapter per cell.
    pub fn simple(cells: usize, vobus: u32, vobu_sectors: u32) -> Self {
        TitleSpec::new(PgcSpec::simple(cells, vobus, vobu_sectors))
    }

    /// Appends a program chain whose chapters follow the existing ones.
    pub fn then(mut self, pgc: PgcSpec) -> Self {
        self.pgcs.push(pgc);
        self
    }

    pub fn angles(mut self, angles: u8) -> Self {
        self.angles = angles;
        self
    }

    fn chapters(&self) -> usize {
        self.pgcs.iter().map(|p| p.programs.len()).sum()
    }
}

/// Sector interval of a laid out cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CellLayout {
    pub first: u32,
    pub last: u32,
    pub vobu_sectors: u32,
}

#[derive(Default)]
pub struct DiscBuilder {
    titles: Vec<TitleSpec>,
    video: [u8; 2],
    audio: Vec<[u8; 8]>,
    subpictures: Vec<[u8; 6]>,
    backups: bool,
}

pub struct Disc {
    pub dir: TempDir,
    /// Cell layouts per title, the cells of all its program chains in order.
    pub cells: Vec<Vec<CellLayout>>,
}

pub fn nav_sector(lba: u32, extra: u32, forward: u32) -> Vec<u8> {
    let mut s = vec![0u8; SECTOR];
    s[0..4].copy_from_slice(&[0x00, 0x00, 0x01, 0xBA]);
    s[38..42].copy_from_slice(&[0x00, 0x00, 0x01, 0xBF]);
    s[1024..1028].copy_from_slice(&[0x00, 0x00, 0x01, 0xBF]);
    s[1030] = 0x01;
    s[DSI + 4..DSI + 8].copy_from_slice(&lba.to_be_bytes());
    s[DSI + 8..DSI + 12].copy_from_slice(&extra.to_be_bytes());
    s[DSI + 314..DSI + 318].copy_from_slice(&forward.to_be_bytes());
    s
}

pub fn data_sector(lba: u32) -> Vec<u8> {
    let mut s = vec![0x5Au8; SECTOR];
    s[..4].copy_from_slice(&lba.to_be_bytes());
    s
}

/// The block address a synthetic sector was written at.
pub fn sector_address(s: &[u8]) -> u32 {
    let mut b = [0u8; 4];
    if s[41] == 0xBF && s[1027] == 0xBF {
        b.copy_from_slice(&s[DSI + 4..DSI + 8]);
    } else {
        b.copy_from_slice(&s[..4]);
    }
    u32::from_be_bytes(b)
}

fn put_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

fn pad(buf: &mut Vec<u8>) {
    let len = (buf.len() + SECTOR - 1) / SECTOR * SECTOR;
    buf.resize(len.max(SECTOR), 0);
}

fn sectors(len: usize) -> u32 {
    ((len + SECTOR - 1) / SECTOR).max(1) as u32
}

impl DiscBuilder {
    pub fn new() -> Self {
        DiscBuilder::default()
    }

    pub fn title(mut self, title: TitleSpec) -> Self {
        self.titles.push(title);
        self
    }

    pub fn video(mut self, attrs: [u8; 2]) -> Self {
        self.video = attrs;
        self
    }

    pub fn audio(mut self, attrs: [u8; 8]) -> Self {
        self.audio.push(attrs);
        self
    }

    pub fn subpicture(mut self, attrs: [u8; 6]) -> Self {
        self.subpictures.push(attrs);
        self
    }

    /// Also write `.BUP` copies of every IFO.
    pub fn backups(mut self) -> Self {
        self.backups = true;
        self
    }

    pub fn build(self) -> Disc {
        let dir = tempfile::tempdir().unwrap();
        let video_ts = dir.path().join("VIDEO_TS");
        fs::create_dir(&video_ts).unwrap();

        let (vob, cells) = self.vob();
        let vmg = self.vmg();
        let vts = self.vts(&cells);

        fs::write(video_ts.join("VIDEO_TS.IFO"), &vmg).unwrap();
        fs::write(video_ts.join("VTS_01_0.IFO"), &vts).unwrap();
        if self.backups {
            fs::write(video_ts.join("VIDEO_TS.BUP"), &vmg).unwrap();
            fs::write(video_ts.join("VTS_01_0.BUP"), &vts).unwrap();
        }
        fs::write(video_ts.join("VTS_01_1.VOB"), &vob).unwrap();

        Disc { dir, cells }
    }

    fn vob(&self) -> (Vec<u8>, Vec<Vec<CellLayout>>) {
        let mut image = Vec::new();
        let mut layouts = Vec::new();
        let mut lba = 0u32;
        for title in &self.titles {
            let mut cells = Vec::new();
            for cell in title.pgcs.iter().flat_map(|p| &p.cells) {
                let first = lba;
                for vobu in 0..cell.vobus {
                    let forward = if vobu + 1 == cell.vobus {
                        END_OF_CELL
                    } else {
                        0x8000_0000 | cell.vobu_sectors
                    };
                    image.extend_from_slice(&nav_sector(lba, cell.vobu_sectors - 1, forward));
                    for i in 1..cell.vobu_sectors {
                        image.extend_from_slice(&data_sector(lba + i));
                    }
                    lba += cell.vobu_sectors;
                }
                cells.push(CellLayout {
                    first,
                    last: lba - 1,
                    vobu_sectors: cell.vobu_sectors,
                });
            }
            layouts.push(cells);
        }
        (image, layouts)
    }

    fn vmg(&self) -> Vec<u8> {
        let mut mat = vec![0u8; SECTOR];
        mat[..12].copy_from_slice(b"DVDVIDEO-VMG");
        put_u16(&mut mat, 0x20, 0x0011);
        put_u16(&mut mat, 0x26, 1);
        put_u16(&mut mat, 0x28, 1);
        put_u16(&mut mat, 0x3E, 1);
        mat[0x40..0x40 + 14].copy_from_slice(b"VOBSTREAM TEST");
        put_u32(&mut mat, 0xC4, 1);

        let n = self.titles.len();
        let mut srpt = vec![0u8; 8 + 12 * n];
        put_u16(&mut srpt, 0, n as u16);
        put_u32(&mut srpt, 4, (8 + 12 * n - 1) as u32);
        for (i, title) in self.titles.iter().enumerate() {
            let e = 8 + 12 * i;
            srpt[e] = 0x3C;
            srpt[e + 1] = title.angles;
            put_u16(&mut srpt, e + 2, title.chapters() as u16);
            srpt[e + 6] = 1;
            srpt[e + 7] = (i + 1) as u8;
        }
        pad(&mut srpt);

        mat.extend_from_slice(&srpt);
        let last = (mat.len() / SECTOR - 1) as u32;
        put_u32(&mut mat, 0x0C, last);
        mat
    }

    fn pgc(&self, spec: &PgcSpec, layout: &[CellLayout]) -> Vec<u8> {
        let n_cells = spec.cells.len();
        let n_programs = spec.programs.len();
        let map_at = 0xEC;
        let playback_at = map_at + (n_programs + 1) / 2 * 2;
        let position_at = playback_at + 24 * n_cells;

        let mut pgc = vec![0u8; position_at + 4 * n_cells];
        pgc[2] = n_programs as u8;
        pgc[3] = n_cells as u8;
        pgc[4..8].copy_from_slice(&spec.time);
        put_u16(&mut pgc, 0xE6, map_at as u16);
        put_u16(&mut pgc, 0xE8, playback_at as u16);
        put_u16(&mut pgc, 0xEA, position_at as u16);

        pgc[map_at..map_at + n_programs].copy_from_slice(&spec.programs);
        for (i, (cell, at)) in spec.cells.iter().zip(layout).enumerate() {
            let e = playback_at + 24 * i;
            pgc[e] = match cell.block {
                Block::None => 0x00,
                Block::First => 0x50,
                Block::Middle => 0x90,
                Block::Last => 0xD0,
            };
            pgc[e + 4..e + 8].copy_from_slice(&cell.time);
            put_u32(&mut pgc, e + 8, at.first);
            put_u32(&mut pgc, e + 20, at.last);

            let p = position_at + 4 * i;
            put_u16(&mut pgc, p, 1);
            pgc[p + 3] = (i + 1) as u8;
        }
        pgc
    }

    fn vts(&self, layouts: &[Vec<CellLayout>]) -> Vec<u8> {
        let n = self.titles.len();

        // PTT_SRPT: one chapter per program, program chains numbered across
        // all titles
        let mut ptt = vec![0u8; 8 + 4 * n];
        put_u16(&mut ptt, 0, n as u16);
        let mut pgcn = 0u16;
        for (i, title) in self.titles.iter().enumerate() {
            let offset = ptt.len() as u32;
            put_u32(&mut ptt, 8 + 4 * i, offset);
            for pgc in &title.pgcs {
                pgcn += 1;
                for pgn in 1..=pgc.programs.len() {
                    ptt.extend_from_slice(&pgcn.to_be_bytes());
                    ptt.extend_from_slice(&(pgn as u16).to_be_bytes());
                }
            }
        }
        let last = (ptt.len() - 1) as u32;
        put_u32(&mut ptt, 4, last);
        let ptt_sectors = sectors(ptt.len());
        pad(&mut ptt);

        let n_pgcs = pgcn as usize;
        let mut pgcit = vec![0u8; 8 + 8 * n_pgcs];
        put_u16(&mut pgcit, 0, n_pgcs as u16);
        let mut entry = 0;
        for (i, (title, layout)) in self.titles.iter().zip(layouts).enumerate() {
            let mut cells = &layout[..];
            for (j, pgc) in title.pgcs.iter().enumerate() {
                let offset = pgcit.len() as u32;
                let ttn = (i + 1) as u8;
                pgcit[8 + 8 * entry] = if j == 0 { 0x80 | ttn } else { ttn };
                put_u32(&mut pgcit, 8 + 8 * entry + 4, offset);
                let (own, rest) = cells.split_at(pgc.cells.len());
                pgcit.extend_from_slice(&self.pgc(pgc, own));
                cells = rest;
                entry += 1;
            }
        }
        let last = (pgcit.len() - 1) as u32;
        put_u32(&mut pgcit, 4, last);
        pad(&mut pgcit);

        let mut mat = vec![0u8; SECTOR];
        mat[..12].copy_from_slice(b"DVDVIDEO-VTS");
        put_u16(&mut mat, 0x20, 0x0011);
        put_u32(&mut mat, 0xC8, 1);
        put_u32(&mut mat, 0xCC, 1 + ptt_sectors);
        mat[0x200..0x202].copy_from_slice(&self.video);
        put_u16(&mut mat, 0x202, self.audio.len() as u16);
        for (i, a) in self.audio.iter().enumerate() {
            mat[0x204 + 8 * i..0x204 + 8 * i + 8].copy_from_slice(a);
        }
        put_u16(&mut mat, 0x254, self.subpictures.len() as u16);
        for (i, s) in self.subpictures.iter().enumerate() {
            mat[0x256 + 6 * i..0x256 + 6 * i + 6].copy_from_slice(s);
        }

        mat.extend_from_slice(&ptt);
        mat.extend_from_slice(&pgcit);
        let last = (mat.len() / SECTOR - 1) as u32;
        put_u32(&mut mat, 0x0C, last);
        mat
    }
}

impl Disc {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn video_ts(&self) -> PathBuf {
        self.dir.path().join("VIDEO_TS")
    }

    /// Replaces the sector at `lba` of the title VOB.
    pub fn overwrite_sector(&self, lba: u32, sector: &[u8]) {
        let mut f = OpenOptions::new()
            .write(true)
            .open(self.video_ts().join("VTS_01_1.VOB"))
            .unwrap();
        f.seek(SeekFrom::Start(u64::from(lba) * SECTOR as u64)).unwrap();
        f.write_all(sector).unwrap();
    }

    /// 0-based index of the cell of `title` (0-based) containing `lba`.
    pub fn cell_of(&self, title: usize, lba: u32) -> Option<usize> {
        self.cells[title]
            .iter()
            .position(|c| c.first <= lba && lba <= c.last)
    }

    /// Cell indexes of `title` (0-based) touched by `output`, deduplicated in
    /// order.
    pub fn cells_in(&self, title: usize, output: &[u8]) -> Vec<usize> {
        let mut cells: Vec<usize> = Vec::new();
        for s in output.chunks(SECTOR) {
            if let Some(c) = self.cell_of(title, sector_address(s)) {
                if cells.last() != Some(&c) {
                    cells.push(c);
                }
            }
        }
        cells
    }
}

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = RefCell::new(Vec::new());
}

// Keeps each test thread's records apart.
struct Capture;

impl Log for Capture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS.with(|r| r.borrow_mut().push((record.level(), record.args().to_string())));
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture;

/// Starts recording log output of the calling thread.
pub fn capture_logs() {
    // another test may have installed it already
    let _ = log::set_logger(&CAPTURE);
    log::set_max_level(LevelFilter::Debug);
    RECORDS.with(|r| r.borrow_mut().clear());
}

/// Records logged on the calling thread since the last call.
pub fn take_logs() -> Vec<(Level, String)> {
    RECORDS.with(|r| r.replace(Vec::new()))
}
