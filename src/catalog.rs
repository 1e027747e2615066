//! Loading the disc catalog from `VIDEO_TS.IFO` and `VTS_nn_0.IFO`.
use crate::error::{DvdError, Result};
use crate::parser::{self, VtsMat};
use crate::sector::SECTOR_SIZE;
use crate::types::{Catalog, TitleSet};
use log::{debug, warn};
use nom::IResult;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

/// Finds `name` in `dir`, ignoring ASCII case. Copied discs often carry
/// lower-case names.
pub(crate) fn find_entry(dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    let exact = dir.join(name);
    if exact.exists() {
        return Ok(Some(exact));
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Resolves `disc_root` to its `VIDEO_TS` directory. `disc_root` may be the
/// mount point of the disc or the `VIDEO_TS` directory itself.
pub fn video_ts_dir(disc_root: &Path) -> Result<PathBuf> {
    if !disc_root.is_dir() {
        return Err(DvdError::structure(
            disc_root.display().to_string(),
            "not a directory",
        ));
    }
    if let Some(dir) = find_entry(disc_root, "VIDEO_TS")? {
        if dir.is_dir() {
            return Ok(dir);
        }
    }
    if find_entry(disc_root, "VIDEO_TS.IFO")?.is_some() {
        return Ok(disc_root.to_path_buf());
    }
    Err(DvdError::structure(
        disc_root.display().to_string(),
        "no VIDEO_TS directory",
    ))
}

// Runs `parse` over the bytes of `<stem>.IFO`, falling back to `<stem>.BUP`
// when the primary copy is missing or does not parse.
fn load_ifo<T, F>(dir: &Path, stem: &str, parse: F) -> Result<T>
where
    F: Fn(&[u8]) -> std::result::Result<T, String>,
{
    let ifo = format!("{}.IFO", stem);
    let primary = match find_entry(dir, &ifo)? {
        Some(path) => match fs::read(&path) {
            Ok(bytes) => parse(&bytes),
            Err(e) => Err(e.to_string()),
        },
        None => Err("file not found".to_string()),
    };

    let reason = match primary {
        Ok(v) => return Ok(v),
        Err(reason) => reason,
    };

    let bup = format!("{}.BUP", stem);
    match find_entry(dir, &bup)? {
        Some(path) => {
            warn!("{}: {}, trying {}", ifo, reason, bup);
            let bytes = fs::read(&path)?;
            parse(&bytes).map_err(|r| DvdError::structure(bup, r))
        }
        None => Err(DvdError::structure(ifo, reason)),
    }
}

// Applies a table parser to the table starting at `sector` in `bytes`.
fn table_at<'a, T>(
    bytes: &'a [u8],
    sector: u32,
    name: &str,
    parse: fn(&'a [u8]) -> IResult<&'a [u8], T>,
) -> std::result::Result<T, String> {
    let offset = sector as usize * SECTOR_SIZE;
    if sector == 0 || offset >= bytes.len() {
        return Err(format!("{} at sector {} outside the file", name, sector));
    }
    parse(&bytes[offset..])
        .map(|(_, t)| t)
        .map_err(|e| format!("bad {}: {:?}", name, e.map(|(_, kind)| kind)))
}

fn parse_title_set(number: u8, bytes: &[u8]) -> std::result::Result<TitleSet, String> {
    let mat: VtsMat = parser::vtsi_mat(bytes)
        .map(|(_, m)| m)
        .map_err(|e| format!("bad VTSI header: {:?}", e.map(|(_, kind)| kind)))?;
    let chapters = table_at(bytes, mat.ptt_srpt_sector, "VTS_PTT_SRPT", parser::ptt_srpt)?;
    let program_chains = table_at(bytes, mat.pgcit_sector, "VTS_PGCIT", parser::pgcit)?;

    debug!(
        "title set {}: {} titles, {} program chains",
        number,
        chapters.len(),
        program_chains.len()
    );

    Ok(TitleSet {
        number,
        last_sector: mat.last_sector,
        version: mat.version,
        category: mat.category,
        chapters,
        program_chains,
        video: mat.video,
        audio: mat.audio,
        subpictures: mat.subpictures,
    })
}

impl Catalog {
    /// Loads the title table and every title set it refers to.
    ///
    /// # Examples
    /// ```no_run
    /// use vobstream::Catalog;
    ///
    /// let catalog = Catalog::load("/media/dvd".as_ref()).expect("unreadable disc");
    /// for title in &catalog.titles {
    ///     println!("title {}: {} chapters", title.number, title.chapter_count);
    /// }
    /// ```
    pub fn load(disc_root: &Path) -> Result<Catalog> {
        Catalog::load_with(disc_root, None)
    }

    /// Loads the title table and only the title set holding `title`.
    pub fn load_for_title(disc_root: &Path, title: u16) -> Result<Catalog> {
        Catalog::load_with(disc_root, Some(title))
    }

    fn load_with(disc_root: &Path, only: Option<u16>) -> Result<Catalog> {
        let dir = video_ts_dir(disc_root)?;

        let (volume, titles) = load_ifo(&dir, "VIDEO_TS", |bytes| {
            let (_, mat) = parser::vmgi_mat(bytes)
                .map_err(|e| format!("bad VMGI header: {:?}", e.map(|(_, kind)| kind)))?;
            let titles = table_at(bytes, mat.tt_srpt_sector, "TT_SRPT", parser::tt_srpt)?;
            Ok((mat.volume, titles))
        })?;
        debug!(
            "{}: {} titles in {} title sets",
            dir.display(),
            titles.len(),
            volume.title_set_count
        );

        let mut catalog = Catalog {
            volume,
            titles,
            title_sets: BTreeMap::new(),
        };

        let wanted: BTreeSet<u8> = match only {
            Some(n) => std::iter::once(catalog.title(n)?.title_set).collect(),
            None => catalog.titles.iter().map(|t| t.title_set).collect(),
        };

        for vtsn in wanted {
            if vtsn == 0 {
                return Err(DvdError::structure("TT_SRPT", "title refers to title set 0"));
            }
            let stem = format!("VTS_{:02}_0", vtsn);
            let ts = load_ifo(&dir, &stem, |bytes| parse_title_set(vtsn, bytes))?;
            catalog.title_sets.insert(vtsn, ts);
        }

        Ok(catalog)
    }

    /// Title sets that were loaded, in title set order.
    pub fn title_sets(&self) -> impl Iterator<Item = &TitleSet> {
        self.title_sets.values()
    }
}
