use crate::bits::{field, flag};
use crate::nav::{AngleLink, Dsi};
use crate::types::{
    AudioAttributes, BlockMode, BlockType, Cell, CellPosition, Chapter, DvdTime, ProgramChain,
    SubpictureAttributes, Title, VideoAttributes, VolumeInfo,
};
use nom::{
    bytes::complete::{tag, take},
    combinator::map,
    do_parse,
    error::ErrorKind,
    multi::count,
    number::complete::{be_u16, be_u32, be_u8},
    sequence::tuple,
    take, Err, IResult,
};

pub const VMG_ID: &str = "DVDVIDEO-VMG";
pub const VTS_ID: &str = "DVDVIDEO-VTS";

/// Byte offset of the DSI payload inside a NAV pack.
pub const DSI_START_BYTE: usize = 1031;

/// The parts of the VMGI_MAT header the catalog needs.
#[derive(Debug, Clone)]
pub struct VmgMat {
    pub volume: VolumeInfo,
    pub last_sector: u32,
    pub first_play_pgc: u32,
    pub tt_srpt_sector: u32,
}

/// The parts of the VTSI_MAT header the catalog needs.
#[derive(Debug, Clone)]
pub struct VtsMat {
    pub last_sector: u32,
    pub version: u16,
    pub category: u32,
    pub ptt_srpt_sector: u32,
    pub pgcit_sector: u32,
    pub video: VideoAttributes,
    pub audio: Vec<AudioAttributes>,
    pub subpictures: Vec<SubpictureAttributes>,
}

// skips to `offset` bytes into `input`
fn seek(input: &[u8], offset: usize) -> IResult<&[u8], ()> {
    map(take(offset), |_| ())(input)
}

fn fixed_str(input: &[u8], len: usize) -> IResult<&[u8], String> {
    map(take(len), |s: &[u8]| {
        String::from_utf8_lossy(s)
            .trim_end_matches(|c| c == '\0' || c == ' ')
            .to_string()
    })(input)
}

fn dvd_time(input: &[u8]) -> IResult<&[u8], DvdTime> {
    map(
        tuple((be_u8, be_u8, be_u8, be_u8)),
        |(hour, minute, second, frame_u)| DvdTime {
            hour,
            minute,
            second,
            frame_u,
        },
    )(input)
}

pub fn vmgi_mat(input: &[u8]) -> IResult<&[u8], VmgMat> {
    let (input, _) = tag(VMG_ID)(input)?;
    // 0x0C
    let (input, (last_sector, _, _last_ifo_sector, version, category)) =
        tuple((be_u32, take(12usize), be_u32, be_u16, be_u32))(input)?;
    // 0x26
    let (input, (volume_count, volume_number, side, _, title_set_count)) =
        tuple((be_u16, be_u16, be_u8, take(19usize), be_u16))(input)?;
    // 0x40
    let (input, provider_id) = fixed_str(input, 32)?;
    // 0x60: position code, reserved, end of VMGI_MAT
    let (input, (_, first_play_pgc, _, _menu_vobs, tt_srpt_sector)) =
        tuple((take(36usize), be_u32, take(56usize), be_u32, be_u32))(input)?;

    Ok((
        input,
        VmgMat {
            volume: VolumeInfo {
                version,
                category,
                volume_count,
                volume_number,
                side,
                title_set_count,
                provider_id,
            },
            last_sector,
            first_play_pgc,
            tt_srpt_sector,
        },
    ))
}

fn title_entry(input: &[u8]) -> IResult<&[u8], Title> {
    do_parse!(
        input,
        playback_type: be_u8
            >> angle_count: be_u8
            >> chapter_count: be_u16
            >> parental_mask: be_u16
            >> title_set: be_u8
            >> title_set_title: be_u8
            >> title_set_sector: be_u32
            >> (Title {
                number: 0,
                playback_type,
                angle_count,
                chapter_count,
                parental_mask,
                title_set,
                title_set_title,
                title_set_sector,
            })
    )
}

/// Parses the title search pointer table.
pub fn tt_srpt(input: &[u8]) -> IResult<&[u8], Vec<Title>> {
    let (input, (n_titles, _, _last_byte)) = tuple((be_u16, take(2usize), be_u32))(input)?;
    let (input, mut titles) = count(title_entry, n_titles as usize)(input)?;
    for (i, t) in titles.iter_mut().enumerate() {
        t.number = (i + 1) as u16;
    }
    Ok((input, titles))
}

fn audio_attrs(input: &[u8]) -> IResult<&[u8], AudioAttributes> {
    map(take(8usize), |b: &[u8]| {
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        AudioAttributes(a)
    })(input)
}

fn subpicture_attrs(input: &[u8]) -> IResult<&[u8], SubpictureAttributes> {
    map(take(6usize), |b: &[u8]| {
        let mut a = [0u8; 6];
        a.copy_from_slice(b);
        SubpictureAttributes(a)
    })(input)
}

pub fn vtsi_mat(input: &[u8]) -> IResult<&[u8], VtsMat> {
    let (input, _) = tag(VTS_ID)(input)?;
    // 0x0C
    let (input, (last_sector, _, _last_ifo_sector, version, category)) =
        tuple((be_u32, take(12usize), be_u32, be_u16, be_u32))(input)?;
    // 0x26 .. 0xC0 reserved, end of VTSI_MAT
    let (input, _) = take(0xC0usize - 0x26)(input)?;
    let (input, (_menu_vobs, _title_vobs, ptt_srpt_sector, pgcit_sector)) =
        tuple((be_u32, be_u32, be_u32, be_u32))(input)?;
    // 0xD0 .. 0x200: remaining table pointers and the menu attributes
    let (input, _) = take(0x200usize - 0xD0)(input)?;
    let (input, video) = map(take(2usize), |b: &[u8]| VideoAttributes([b[0], b[1]]))(input)?;
    let (input, n_audio) = be_u16(input)?;
    let (input, mut audio) = count(audio_attrs, 8)(input)?;
    let (input, _) = take(16usize)(input)?;
    let (input, n_subpictures) = be_u16(input)?;
    let (input, mut subpictures) = count(subpicture_attrs, 32)(input)?;

    audio.truncate(n_audio as usize);
    subpictures.truncate(n_subpictures as usize);

    Ok((
        input,
        VtsMat {
            last_sector,
            version,
            category,
            ptt_srpt_sector,
            pgcit_sector,
            video,
            audio,
            subpictures,
        },
    ))
}

fn ptt(input: &[u8]) -> IResult<&[u8], Chapter> {
    do_parse!(input, pgcn: be_u16 >> pgn: be_u16 >> (Chapter { pgcn, pgn }))
}

/// Parses a part-of-title search pointer table. `table` starts at the table
/// itself, since the per-title offsets are relative to it.
pub fn ptt_srpt(table: &[u8]) -> IResult<&[u8], Vec<Vec<Chapter>>> {
    let (input, (n_titles, _, last_byte)) = tuple((be_u16, take(2usize), be_u32))(table)?;
    let (input, offsets) = count(be_u32, n_titles as usize)(input)?;

    // some authoring tools write a last byte past the table; clamp to the data
    let end = (last_byte as usize).saturating_add(1).min(table.len());
    let mut titles = Vec::with_capacity(offsets.len());
    for (i, &start) in offsets.iter().enumerate() {
        let start = start as usize;
        let stop = offsets.get(i + 1).map(|&o| o as usize).unwrap_or(end);
        if stop < start || stop > table.len() {
            return Err(Err::Error((input, ErrorKind::Verify)));
        }
        let (entries, _) = seek(table, start)?;
        let (_, chapters) = count(ptt, (stop - start) / 4)(entries)?;
        titles.push(chapters);
    }
    Ok((input, titles))
}

fn cell_playback(input: &[u8]) -> IResult<&[u8], Cell> {
    let (input, (flags, _, still_time, command_number, playback_time)) =
        tuple((be_u8, be_u8, be_u8, be_u8, dvd_time))(input)?;
    let (input, (first_sector, first_ilvu_end_sector, last_vobu_start_sector, last_sector)) =
        tuple((be_u32, be_u32, be_u32, be_u32))(input)?;

    // MMTT SIDA <-- block mode, block type, seamless, interleaved,
    //               STC discontinuity, seamless angle
    let block_mode = match field(flags, 6, 2) {
        0b00 => BlockMode::NotInBlock,
        0b01 => BlockMode::FirstCell,
        0b10 => BlockMode::InBlock,
        _ => BlockMode::LastCell,
    };
    let block_type = match field(flags, 4, 2) {
        0b00 => BlockType::Normal,
        0b01 => BlockType::Angle,
        n => BlockType::Unknown(n),
    };

    Ok((
        input,
        Cell {
            block_mode,
            block_type,
            seamless_play: flag(flags, 3),
            interleaved: flag(flags, 2),
            stc_discontinuity: flag(flags, 1),
            seamless_angle: flag(flags, 0),
            still_time,
            command_number,
            playback_time,
            first_sector,
            first_ilvu_end_sector,
            last_vobu_start_sector,
            last_sector,
        },
    ))
}

fn cell_position(input: &[u8]) -> IResult<&[u8], CellPosition> {
    do_parse!(
        input,
        vob_id: be_u16 >> take!(1usize) >> cell_id: be_u8 >> (CellPosition { vob_id, cell_id })
    )
}

fn program_chain(pgc: &[u8], is_entry: bool, title_number: u8) -> IResult<&[u8], ProgramChain> {
    let (input, (_, n_programs, n_cells, playback_time, prohibited_ops)) =
        tuple((take(2usize), be_u8, be_u8, dvd_time, be_u32))(pgc)?;
    // 0x0C: audio and subpicture stream control
    let (input, _) = take(0x9Cusize - 0x0C)(input)?;
    let (input, (next_pgcn, prev_pgcn, goup_pgcn, still_time, playback_mode)) =
        tuple((be_u16, be_u16, be_u16, be_u8, be_u8))(input)?;
    // 0xA4: palette
    let (input, _) = take(64usize)(input)?;
    let (input, (_commands, program_map_at, cell_playback_at, cell_position_at)) =
        tuple((be_u16, be_u16, be_u16, be_u16))(input)?;

    let program_map = if n_programs > 0 && program_map_at != 0 {
        let (map_data, _) = seek(pgc, program_map_at as usize)?;
        let (_, m) = take(n_programs as usize)(map_data)?;
        m.to_vec()
    } else {
        Vec::new()
    };

    let cells = if n_cells > 0 && cell_playback_at != 0 {
        let (data, _) = seek(pgc, cell_playback_at as usize)?;
        count(cell_playback, n_cells as usize)(data)?.1
    } else {
        Vec::new()
    };

    let cell_positions = if n_cells > 0 && cell_position_at != 0 {
        let (data, _) = seek(pgc, cell_position_at as usize)?;
        count(cell_position, n_cells as usize)(data)?.1
    } else {
        Vec::new()
    };

    Ok((
        input,
        ProgramChain {
            is_entry,
            title_number,
            playback_time,
            prohibited_ops,
            next_pgcn,
            prev_pgcn,
            goup_pgcn,
            still_time,
            playback_mode,
            program_map,
            cells,
            cell_positions,
        },
    ))
}

/// Parses a program chain information table. `table` starts at the table
/// itself, since program chain offsets are relative to it.
pub fn pgcit(table: &[u8]) -> IResult<&[u8], Vec<ProgramChain>> {
    let (input, (n_pgcs, _, _last_byte)) = tuple((be_u16, take(2usize), be_u32))(table)?;
    let (input, entries) = count(tuple((be_u8, be_u8, be_u16, be_u32)), n_pgcs as usize)(input)?;

    let mut pgcs = Vec::with_capacity(entries.len());
    for (category, _, _parental_mask, offset) in entries {
        let (data, _) = seek(table, offset as usize)?;
        // E TTTTTTT <-- entry PGC flag, title number
        let (_, pgc) = program_chain(data, flag(category, 7), field(category, 0, 7))?;
        pgcs.push(pgc);
    }
    Ok((input, pgcs))
}

fn angle_link(input: &[u8]) -> IResult<&[u8], AngleLink> {
    map(tuple((be_u32, be_u16)), |(address, size)| AngleLink {
        address,
        size,
    })(input)
}

/// Parses the DSI packet of a NAV pack, starting at [`DSI_START_BYTE`].
///
/// [`DSI_START_BYTE`]: constant.DSI_START_BYTE.html
pub fn dsi(input: &[u8]) -> IResult<&[u8], Dsi> {
    let (input, (scr, self_address, extra_sectors)) = tuple((be_u32, be_u32, be_u32))(input)?;
    // first/second/third reference frame end addresses
    let (input, _) = take(12usize)(input)?;
    let (input, (vob_id, _, cell_id, cell_elapsed)) =
        tuple((be_u16, be_u8, be_u8, dvd_time))(input)?;
    // seamless playback info
    let (input, _) = take(148usize)(input)?;
    let (input, angles) = count(angle_link, 9)(input)?;
    // next_video, forward addresses, next_vobu
    let (input, (next_video, _, forward_link)) = tuple((be_u32, take(76usize), be_u32))(input)?;

    Ok((
        input,
        Dsi {
            scr,
            self_address,
            extra_sectors,
            vob_id,
            cell_id,
            cell_elapsed,
            angles,
            next_video,
            forward_link,
        },
    ))
}
