//! A reading session: the loaded catalog, the open title VOBs and the
//! extraction entry points.
use crate::catalog::video_ts_dir;
use crate::config::ReaderConfig;
use crate::error::{DvdError, Result};
use crate::extract::{copy_sectors, extract_range};
use crate::lock::{DeviceLock, LockManager};
use crate::nav::{Traversal, TraversalStats};
use crate::probe::{probe_title, TitleProbe};
use crate::sector::VobSet;
use crate::selector::{Resolved, Selector};
use crate::types::Catalog;
use log::{debug, info, warn};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// Result of a NAV-walked extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Bytes written to the sink.
    pub bytes: u64,
    pub traversal: TraversalStats,
}

/// An open disc.
///
/// # Examples
/// ```no_run
/// use std::fs::File;
/// use vobstream::{ReaderConfig, Selector, Session};
///
/// let mut session = Session::open("/media/dvd", ReaderConfig::default()).unwrap();
/// let selector: Selector = "1,2-4".parse().unwrap();
/// let mut out = File::create("title1.vob").unwrap();
/// let stats = session.extract(&selector, &mut out).unwrap();
/// println!("{} bytes, {} VOBUs", stats.bytes, stats.traversal.vobus);
/// ```
pub struct Session {
    video_ts: PathBuf,
    catalog: Catalog,
    config: ReaderConfig,
    // title VOBs of the most recently used title set
    source: Option<(u8, VobSet)>,
}

impl Session {
    /// Loads the catalog of the disc at `disc_root` under the device lock.
    pub fn open<P: AsRef<Path>>(disc_root: P, config: ReaderConfig) -> Result<Session> {
        Session::open_with(disc_root.as_ref(), None, config)
    }

    /// Like [`open`], but loads only the title set holding `title`.
    ///
    /// [`open`]: #method.open
    pub fn open_for_title<P: AsRef<Path>>(disc_root: P, title: u16, config: ReaderConfig) -> Result<Session> {
        Session::open_with(disc_root.as_ref(), Some(title), config)
    }

    fn open_with(disc_root: &Path, title: Option<u16>, config: ReaderConfig) -> Result<Session> {
        let video_ts = video_ts_dir(disc_root)?;
        let _lock = lock(&config)?;
        let catalog = match title {
            Some(t) => Catalog::load_for_title(disc_root, t)?,
            None => Catalog::load(disc_root)?,
        };
        info!(
            "opened {}: {} titles",
            video_ts.display(),
            catalog.title_count()
        );
        Ok(Session {
            video_ts,
            catalog,
            config,
            source: None,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// The `VIDEO_TS` directory this session reads from.
    pub fn video_ts(&self) -> &Path {
        &self.video_ts
    }

    /// Checks `selector` against the catalog without touching the disc.
    pub fn resolve(&self, selector: &Selector) -> Result<Resolved> {
        selector.resolve(&self.catalog)
    }

    /// Streams the VOBUs of the selected chapters and angle to `sink`,
    /// following the NAV pack links. A range crossing program chains plays
    /// each chain's cells in turn.
    pub fn extract<W: Write + ?Sized>(&mut self, selector: &Selector, sink: &mut W) -> Result<ExtractStats> {
        let resolved = selector.resolve(&self.catalog)?;
        let vtsn = self.catalog.title(resolved.title)?.title_set;
        let batch = self.config.batch_sectors;
        let nav = self.config.nav_options();

        let _lock = lock(&self.config)?;
        let source = title_vobs(&mut self.source, &self.video_ts, vtsn)?;

        let mut stats = ExtractStats::default();
        for range in &resolved.ranges {
            let pgc = self.catalog.program_chain(resolved.title, range.pgcn)?;
            debug!(
                "title {}: PGC {} cells {}..={} angle {}",
                resolved.title,
                range.pgcn,
                range.start_cell + 1,
                range.end_cell + 1,
                resolved.angle + 1
            );
            let mut traversal = Traversal::new(pgc, range.start_cell, range.end_cell, resolved.angle, nav)?;
            while let Some(span) = traversal.next_span(source)? {
                stats.bytes += copy_sectors(source, span.first_sector, span.sector_count, sink, batch)?;
            }
            stats.traversal.append(traversal.into_stats());
        }
        sink.flush().map_err(DvdError::Write)?;

        if stats.traversal.desyncs > 0 {
            warn!(
                "title {}: recovered from {} desynchronized NAV packs",
                resolved.title, stats.traversal.desyncs
            );
        }
        Ok(stats)
    }

    /// Dumps the whole sector interval of the selected chapters to `sink`
    /// without reading NAV packs, one interval per program chain crossed.
    /// The angle is validated but otherwise ignored. Returns the number of
    /// bytes written.
    pub fn extract_bulk<W: Write + ?Sized>(&mut self, selector: &Selector, sink: &mut W) -> Result<u64> {
        let resolved = selector.resolve(&self.catalog)?;
        let vtsn = self.catalog.title(resolved.title)?.title_set;

        let _lock = lock(&self.config)?;
        let source = title_vobs(&mut self.source, &self.video_ts, vtsn)?;
        let mut bytes = 0;
        for range in &resolved.ranges {
            let pgc = self.catalog.program_chain(resolved.title, range.pgcn)?;
            bytes += extract_range(source, pgc, range, sink, self.config.batch_sectors)?;
        }
        sink.flush().map_err(DvdError::Write)?;
        Ok(bytes)
    }

    pub fn probe(&self, title: u16) -> Result<TitleProbe> {
        probe_title(&self.catalog, title)
    }
}

// Takes the device lock, or proceeds without it when it stays busy.
fn lock(config: &ReaderConfig) -> Result<Option<DeviceLock>> {
    let path = match &config.lock_path {
        Some(p) => p,
        None => return Ok(None),
    };
    match LockManager::new(path.as_path(), config.lock_retry).acquire() {
        Ok(lock) => Ok(Some(lock)),
        Err(e @ DvdError::LockTimeout { .. }) => {
            warn!("{}, continuing without it", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn title_vobs<'a>(slot: &'a mut Option<(u8, VobSet)>, video_ts: &Path, vtsn: u8) -> Result<&'a mut VobSet> {
    let reopen = match slot {
        Some((n, _)) => *n != vtsn,
        None => true,
    };
    if reopen {
        *slot = Some((vtsn, VobSet::open_title_set(video_ts, vtsn)?));
    }
    match slot {
        Some((_, source)) => Ok(source),
        None => Err(DvdError::structure(format!("title set {}", vtsn), "no title VOB files open")),
    }
}
