//! A DVD-Video title extractor.
//!
//! The entry point into this crate is the [`Session`] struct. Opening a
//! session loads the disc [`Catalog`] from `VIDEO_TS.IFO` and the title set
//! `VTS_nn_0.IFO` files; a [`Selector`] then names the title, chapters and
//! angle to pull out of the title VOBs.
//!
//! There are two ways to extract. [`Session::extract`] walks the selected
//! cells one VOBU at a time through the DSI links in each NAV pack, taking
//! only the cells of the requested angle inside angle blocks.
//! [`Session::extract_bulk`] copies the whole sector interval of the chapter
//! range and ignores the NAV packs. For titles without angle blocks both give
//! the same bytes.
//!
//! Sectors are written unmodified. This crate does not demultiplex, decode
//! or decrypt the MPEG program stream; a CSS-protected disc must already be
//! readable in the clear.
//!
//! The on-disc structures are not openly documented. This parser relies on
//! the third-party [DVD-Video information] pages and on what existing
//! open-source players accept.
//!
//! [`Session`]: session/struct.Session.html
//! [`Catalog`]: types/struct.Catalog.html
//! [`Selector`]: selector/struct.Selector.html
//! [`Session::extract`]: session/struct.Session.html#method.extract
//! [`Session::extract_bulk`]: session/struct.Session.html#method.extract_bulk
//! [DVD-Video information]: http://dvd.sourceforge.net/dvdinfo/
//!
//! # Examples
//! ```no_run
//! # fn main() -> vobstream::Result<()> {
//! use std::fs::File;
//! use vobstream::{ReaderConfig, Selector, Session};
//!
//! // load the catalog
//! let mut session = Session::open("/media/dvd", ReaderConfig::default())?;
//!
//! // list the titles
//! for title in &session.catalog().titles {
//!     let probe = session.probe(title.number)?;
//!     println!(
//!         "title {}: {} chapters, {} angles, {:?}",
//!         title.number, probe.chapters, probe.angles, probe.duration
//!     );
//! }
//!
//! // chapters 2 to 4 of title 1, second angle
//! let selector: Selector = "1,2-4,2".parse()?;
//! let mut out = File::create("title1.vob")?;
//! session.extract(&selector, &mut out)?;
//! # Ok(())
//! # }
//! ```
mod bits;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod lock;
pub mod nav;
mod parser;
pub mod probe;
pub mod sector;
pub mod selector;
pub mod session;
pub mod types;

pub use config::ReaderConfig;
pub use error::{DvdError, IndexKind, Result};
pub use lock::{CancelToken, DeviceLock, LockManager, RetryPolicy};
pub use nav::{NavCheck, NavOptions, TraversalStats};
pub use probe::TitleProbe;
pub use sector::{Sector, SectorSource, VobSet, SECTOR_SIZE};
pub use selector::Selector;
pub use session::{ExtractStats, Session};
pub use types::*;
