//! On-disk directory-entry codec: the packed 32-byte record, 8.3 short
//! names, and the packed date/time fields.

use heapless::String;

use crate::error::NameError;

pub const DIR_ENTRY_SIZE: usize = 32;

/// First name byte of a never-used slot; also ends the entry sequence.
pub const ENTRY_FREE: u8 = 0x00;
/// First name byte of a deleted slot, eligible for reuse.
pub const ENTRY_DELETED: u8 = 0xE5;
/// On-disk stand-in for a name actually beginning with 0xE5.
pub const KANJI_LEAD: u8 = 0x05;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
/// VFAT long-name marker; such slots are skipped, never created.
pub const ATTR_LONG_NAME: u8 = 0x0F;

pub const DOT_NAME: [u8; 11] = *b".          ";
pub const DOTDOT_NAME: [u8; 11] = *b"..         ";

/// Default timestamps for new entries: 1 Jan 2000, 01:00:00.
pub const DEFAULT_DATE: u16 = ((2000 - 1980) << 9) | (1 << 5) | 1;
pub const DEFAULT_TIME: u16 = 1 << 11;

/// Decoded form of one 32-byte directory record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attributes: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster: u32,
    pub size: u32,
}

impl DirEntry {
    /// Fresh entry with default timestamps, no clusters, zero size.
    pub fn new(name: [u8; 11], attributes: u8) -> Self {
        Self {
            name,
            attributes,
            create_time: DEFAULT_TIME,
            create_date: DEFAULT_DATE,
            access_date: DEFAULT_DATE,
            write_time: DEFAULT_TIME,
            write_date: DEFAULT_DATE,
            first_cluster: 0,
            size: 0,
        }
    }

    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= DIR_ENTRY_SIZE);
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[0..11]);
        // A name whose first character is 0xE5 is stored as 0x05 so it
        // does not read as a deletion marker.
        if name[0] == KANJI_LEAD {
            name[0] = ENTRY_DELETED;
        }
        let cluster_hi = u16::from_le_bytes([raw[20], raw[21]]);
        let cluster_lo = u16::from_le_bytes([raw[26], raw[27]]);
        Self {
            name,
            attributes: raw[11],
            create_time: u16::from_le_bytes([raw[14], raw[15]]),
            create_date: u16::from_le_bytes([raw[16], raw[17]]),
            access_date: u16::from_le_bytes([raw[18], raw[19]]),
            write_time: u16::from_le_bytes([raw[22], raw[23]]),
            write_date: u16::from_le_bytes([raw[24], raw[25]]),
            first_cluster: ((cluster_hi as u32) << 16) | cluster_lo as u32,
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= DIR_ENTRY_SIZE);
        out[..DIR_ENTRY_SIZE].fill(0);
        out[0..11].copy_from_slice(&self.name);
        if out[0] == ENTRY_DELETED {
            out[0] = KANJI_LEAD;
        }
        out[11] = self.attributes;
        out[14..16].copy_from_slice(&self.create_time.to_le_bytes());
        out[16..18].copy_from_slice(&self.create_date.to_le_bytes());
        out[18..20].copy_from_slice(&self.access_date.to_le_bytes());
        out[20..22].copy_from_slice(&((self.first_cluster >> 16) as u16).to_le_bytes());
        out[22..24].copy_from_slice(&self.write_time.to_le_bytes());
        out[24..26].copy_from_slice(&self.write_date.to_le_bytes());
        out[26..28].copy_from_slice(&(self.first_cluster as u16).to_le_bytes());
        out[28..32].copy_from_slice(&self.size.to_le_bytes());
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == ENTRY_FREE
    }

    pub fn is_dir(&self) -> bool {
        (self.attributes & ATTR_DIRECTORY) != 0
    }

    pub fn is_file(&self) -> bool {
        (self.attributes & (ATTR_DIRECTORY | ATTR_VOLUME_ID)) == 0
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes != ATTR_LONG_NAME && (self.attributes & ATTR_VOLUME_ID) != 0
    }

    pub fn is_long_name(&self) -> bool {
        self.attributes == ATTR_LONG_NAME
    }

    pub fn is_dot_entry(&self) -> bool {
        self.name == DOT_NAME || self.name == DOTDOT_NAME
    }

    /// Pretty `NAME.EXT` form of the padded short name.
    pub fn name_text(&self) -> String<12> {
        short_name_text(&self.name)
    }
}

/// date = (year - 1980) << 9 | month << 5 | day
///
/// The year field is 7 bits; years outside 1980..=2107 clamp to the
/// nearest representable year.
pub fn pack_date(year: u16, month: u8, day: u8) -> u16 {
    year.saturating_sub(1980).min(127) << 9 | (month as u16) << 5 | day as u16
}

/// time = hour << 11 | minute << 5 | second / 2
pub fn pack_time(hour: u8, minute: u8, second: u8) -> u16 {
    (hour as u16) << 11 | (minute as u16) << 5 | (second as u16) >> 1
}

pub fn date_year(date: u16) -> u16 {
    1980 + (date >> 9)
}

pub fn date_month(date: u16) -> u8 {
    ((date >> 5) & 0x0F) as u8
}

pub fn date_day(date: u16) -> u8 {
    (date & 0x1F) as u8
}

pub fn time_hour(time: u16) -> u8 {
    (time >> 11) as u8
}

pub fn time_minute(time: u16) -> u8 {
    ((time >> 5) & 0x3F) as u8
}

pub fn time_second(time: u16) -> u8 {
    2 * (time & 0x1F) as u8
}

/// Builds the padded, upper-cased 11-byte short name from a path
/// component. Exact 8.3 only: no `~` aliasing, no wildcard support.
pub fn make_short_name(component: &str) -> Result<[u8; 11], NameError> {
    let bytes = component.as_bytes();
    if bytes == b"." {
        return Ok(DOT_NAME);
    }
    if bytes == b".." {
        return Ok(DOTDOT_NAME);
    }

    let dot = bytes.iter().position(|&b| b == b'.');
    let (base, ext) = match dot {
        Some(idx) => {
            if bytes[idx + 1..].contains(&b'.') {
                return Err(NameError::Invalid);
            }
            (&bytes[..idx], &bytes[idx + 1..])
        }
        None => (bytes, &[][..]),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(NameError::Invalid);
    }

    let mut out = [b' '; 11];
    for (i, &b) in base.iter().enumerate() {
        out[i] = short_name_char(b)?;
    }
    for (i, &b) in ext.iter().enumerate() {
        out[8 + i] = short_name_char(b)?;
    }
    Ok(out)
}

fn short_name_char(byte: u8) -> Result<u8, NameError> {
    let up = byte.to_ascii_uppercase();
    if up.is_ascii_alphanumeric() || matches!(up, b'_' | b'-' | b'$' | b'~' | b'!' | b'#' | b'%' | b'&' | b'@') {
        Ok(up)
    } else {
        Err(NameError::Invalid)
    }
}

fn short_name_text(raw: &[u8; 11]) -> String<12> {
    let mut out = String::new();
    for &b in &raw[0..8] {
        if b == b' ' {
            break;
        }
        let _ = out.push(b as char);
    }
    if raw[8..11].iter().any(|&b| b != b' ') {
        let _ = out.push('.');
        for &b in &raw[8..11] {
            if b == b' ' {
                break;
            }
            let _ = out.push(b as char);
        }
    }
    out
}
