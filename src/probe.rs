//! Decoding of stream attribute records and playback times into descriptions
//! suitable for inspection.
//!
//! Attribute records that are entirely zero are reported as `None`: a zero
//! record means the authoring tool never filled it in, not MPEG-1 NTSC 4:3.
use crate::bits::{field, flag, iso639};
use crate::error::Result;
use crate::types::{
    AudioAttributes, BlockType, Catalog, CellRange, ProgramChain, SubpictureAttributes,
    VideoAttributes,
};
use std::time::Duration;

pub type LanguageCode = String;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VideoCodec {
    Mpeg1,
    Mpeg2,
    Unknown(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisplayStandard {
    Ntsc,
    Pal,
    Unknown(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AspectRatio {
    FourThree,
    SixteenNine,
    Unknown(u8),
}

/// Whether the material was shot on film or video. Film sources are usually
/// stored progressive with pulldown flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VideoSource {
    Film,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStream {
    pub codec: VideoCodec,
    pub standard: DisplayStandard,
    pub aspect_ratio: AspectRatio,
    pub pan_scan_permitted: bool,
    pub letterbox_permitted: bool,
    pub width: u16,
    pub height: u16,
    pub letterboxed: bool,
    pub source: VideoSource,
    pub line21_field1: bool,
    pub line21_field2: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AudioCodec {
    Ac3,
    Mpeg1,
    Mpeg2Ext,
    Lpcm,
    Dts,
    Unknown(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleDepth {
    Bits16,
    Bits20,
    Bits24,
    /// Dynamic range control; the field carries no depth for compressed audio.
    Drc,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AudioRole {
    Unspecified,
    Normal,
    VisuallyImpaired,
    DirectorsComments,
    AlternateDirectorsComments,
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStream {
    pub codec: AudioCodec,
    pub multichannel_extension: bool,
    pub channels: u8,
    pub sample_depth: SampleDepth,
    pub sample_rate: u32,
    pub language: Option<LanguageCode>,
    pub role: AudioRole,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubpictureRole {
    Unspecified,
    Normal,
    Large,
    Children,
    Captions,
    LargeCaptions,
    ChildrensCaptions,
    Forced,
    DirectorsComments,
    LargeDirectorsComments,
    ChildrensDirectorsComments,
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpictureStream {
    /// Coding mode; 0 is 2-bit run-length.
    pub coding: u8,
    pub language: Option<LanguageCode>,
    pub role: SubpictureRole,
}

/// Audio sample rates by the 2-bit frequency code.
const SAMPLE_RATES: [u32; 4] = [48_000, 96_000, 44_100, 32_000];

impl VideoAttributes {
    pub fn decode(&self) -> Option<VideoStream> {
        let [b0, b1] = self.0;
        if b0 == 0 && b1 == 0 {
            return None;
        }

        // VVSS AAPP <-- mpeg version, standard, aspect ratio, permitted display
        let codec = match field(b0, 6, 2) {
            0 => VideoCodec::Mpeg1,
            1 => VideoCodec::Mpeg2,
            n => VideoCodec::Unknown(n),
        };
        let standard = match field(b0, 4, 2) {
            0 => DisplayStandard::Ntsc,
            1 => DisplayStandard::Pal,
            n => DisplayStandard::Unknown(n),
        };
        let aspect_ratio = match field(b0, 2, 2) {
            0 => AspectRatio::FourThree,
            3 => AspectRatio::SixteenNine,
            n => AspectRatio::Unknown(n),
        };
        let permitted = field(b0, 0, 2);

        // 12?B SSLF <-- line 21 fields, unknown, bit rate, picture size,
        //               letterboxed, film mode
        let lines = if standard == DisplayStandard::Pal { 576 } else { 480 };
        let (width, height) = match field(b1, 2, 2) {
            0 => (720, lines),
            1 => (704, lines),
            2 => (352, lines),
            _ => (352, lines / 2),
        };

        Some(VideoStream {
            codec,
            standard,
            aspect_ratio,
            pan_scan_permitted: permitted == 0 || permitted == 1,
            letterbox_permitted: permitted == 0 || permitted == 2,
            width,
            height,
            letterboxed: flag(b1, 1),
            source: if flag(b1, 0) {
                VideoSource::Film
            } else {
                VideoSource::Video
            },
            line21_field1: flag(b1, 7),
            line21_field2: flag(b1, 6),
        })
    }
}

impl AudioAttributes {
    pub fn decode(&self) -> Option<AudioStream> {
        let b = self.0;
        if b.iter().all(|&x| x == 0) {
            return None;
        }

        // CCCM LLAA <-- codec, multichannel extension, language type, app mode
        let codec = match field(b[0], 5, 3) {
            0 => AudioCodec::Ac3,
            2 => AudioCodec::Mpeg1,
            3 => AudioCodec::Mpeg2Ext,
            4 => AudioCodec::Lpcm,
            6 => AudioCodec::Dts,
            n => AudioCodec::Unknown(n),
        };
        let language = if field(b[0], 2, 2) == 1 {
            iso639(b[2], b[3])
        } else {
            None
        };

        // QQFF ?CCC <-- quantization, sample frequency, unknown, channels - 1
        let sample_depth = match field(b[1], 6, 2) {
            0 => SampleDepth::Bits16,
            1 => SampleDepth::Bits20,
            2 => SampleDepth::Bits24,
            _ => SampleDepth::Drc,
        };
        let sample_rate = SAMPLE_RATES[field(b[1], 4, 2) as usize];
        let channels = field(b[1], 0, 3) + 1;

        let role = match b[5] {
            0 => AudioRole::Unspecified,
            1 => AudioRole::Normal,
            2 => AudioRole::VisuallyImpaired,
            3 => AudioRole::DirectorsComments,
            4 => AudioRole::AlternateDirectorsComments,
            n => AudioRole::Unknown(n),
        };

        Some(AudioStream {
            codec,
            multichannel_extension: flag(b[0], 4),
            channels,
            sample_depth,
            sample_rate,
            language,
            role,
        })
    }
}

impl SubpictureAttributes {
    pub fn decode(&self) -> Option<SubpictureStream> {
        let b = self.0;
        if b.iter().all(|&x| x == 0) {
            return None;
        }

        // CCC? ??TT <-- coding mode, reserved, language type
        let language = if field(b[0], 0, 2) == 1 {
            iso639(b[2], b[3])
        } else {
            None
        };
        let role = match b[5] {
            0 => SubpictureRole::Unspecified,
            1 => SubpictureRole::Normal,
            2 => SubpictureRole::Large,
            3 => SubpictureRole::Children,
            5 => SubpictureRole::Captions,
            6 => SubpictureRole::LargeCaptions,
            7 => SubpictureRole::ChildrensCaptions,
            9 => SubpictureRole::Forced,
            13 => SubpictureRole::DirectorsComments,
            14 => SubpictureRole::LargeDirectorsComments,
            15 => SubpictureRole::ChildrensDirectorsComments,
            n => SubpictureRole::Unknown(n),
        };

        Some(SubpictureStream {
            coding: field(b[0], 5, 3),
            language,
            role,
        })
    }
}

/// Sums the cell playback times of `range` along the first angle.
///
/// Inside an angle block only the block's first cell is counted, since its
/// siblings play instead of it, not after it. A range that starts inside a
/// block does not count that block.
pub fn range_duration(pgc: &ProgramChain, range: &CellRange) -> Duration {
    if pgc.cells.is_empty() {
        return Duration::default();
    }
    let end = range.end_cell.min(pgc.cells.len() - 1);
    let ms: u64 = (range.start_cell..=end)
        .filter(|&i| pgc.cells[i].block_type != BlockType::Angle || pgc.angle_block(i).0 == i)
        .map(|i| pgc.cells[i].playback_time.millis())
        .sum();
    Duration::from_millis(ms)
}

/// Everything known about a title without reading any VOB data.
#[derive(Debug, Clone)]
pub struct TitleProbe {
    pub title: u16,
    pub title_set: u8,
    pub chapters: u16,
    pub angles: u8,
    pub video: Option<VideoStream>,
    pub audio: Vec<Option<AudioStream>>,
    pub subpictures: Vec<Option<SubpictureStream>>,
    pub chapter_durations: Vec<Duration>,
    /// Sum of the playback times of the program chains the chapters use.
    pub duration: Duration,
}

impl TitleProbe {
    /// Sum of the chapter durations, for comparison with `duration`.
    pub fn chapters_total(&self) -> Duration {
        self.chapter_durations.iter().sum()
    }
}

/// Probes `title` (1-based) of a loaded catalog.
pub fn probe_title(catalog: &Catalog, title: u16) -> Result<TitleProbe> {
    let (t, ts, _) = catalog.title_chapters(title)?;
    let chapters = catalog.chapter_count(title)?;

    let mut chapter_durations = Vec::with_capacity(chapters as usize);
    let mut pgcns = Vec::new();
    for ch in 1..=chapters {
        let mut d = Duration::default();
        for range in catalog.chapter_ranges(title, ch, ch)? {
            let pgc = catalog.program_chain(title, range.pgcn)?;
            d += range_duration(pgc, &range);
            if !pgcns.contains(&range.pgcn) {
                pgcns.push(range.pgcn);
            }
        }
        chapter_durations.push(d);
    }

    let mut duration = Duration::default();
    for pgcn in pgcns {
        duration += catalog.program_chain(title, pgcn)?.playback_time.duration();
    }

    Ok(TitleProbe {
        title,
        title_set: t.title_set,
        chapters,
        angles: t.angles(),
        video: ts.video.decode(),
        audio: ts.audio.iter().map(AudioAttributes::decode).collect(),
        subpictures: ts
            .subpictures
            .iter()
            .map(SubpictureAttributes::decode)
            .collect(),
        chapter_durations,
        duration,
    })
}
