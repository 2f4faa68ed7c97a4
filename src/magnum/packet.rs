use bytes::{Bytes, BytesMut};
use log::error;
use nom::number::complete::{be_i16, be_i8, be_u16, be_u8};
use num_enum::TryFromPrimitive;
use std::fmt;

use super::Error;

/// Trailing tag byte of a 21-byte remote control packet. Each tag selects
/// which block of companion-device settings rides in the last seven bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum RemoteTag {
    Base = 0x00,
    Msh = 0x11,
    Bmk = 0x80,
    AgsRun = 0xA0,
    AgsSchedule = 0xA1,
    AgsSoc = 0xA2,
    AgsExercise = 0xA3,
    AgsDelays = 0xA4,
    PtControl = 0xC0,
    PtRelay = 0xC1,
    PtAlarm = 0xC2,
    PtSetpoints = 0xC3,
    PtLog = 0xD0,
}

/// The packet types the Magnum network emits. There is no type byte on the
/// wire; classification is inferred from length and boundary bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    Unknown,
    Rtr,
    AgsStatus,
    AgsCounters,
    BmkStatus,
    Inverter,
    PtStatus,
    PtRatings,
    PtDaily,
    PtFaults,
    Remote(RemoteTag),
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PacketType::*;

        // wire-documentation labels, also used as trace keys
        let label = match self {
            Unknown => "UNKNOWN",
            Rtr => "RTR_91",
            AgsStatus => "AGS_A1",
            AgsCounters => "AGS_A2",
            BmkStatus => "BMK_81",
            Inverter => "INVERTER",
            PtStatus => "PT_C1",
            PtRatings => "PT_C2",
            PtDaily => "PT_C3",
            PtFaults => "PT_C4",
            Remote(tag) => {
                return write!(f, "REMOTE_{:02X}", *tag as u8);
            }
        };
        f.write_str(label)
    }
}

/// A single big-endian field in a packet layout.
#[derive(Clone, Copy, Debug)]
pub enum Field {
    U8,
    I8,
    U16,
    I16,
}

impl Field {
    fn width(self) -> usize {
        match self {
            Field::U8 | Field::I8 => 1,
            Field::U16 | Field::I16 => 2,
        }
    }
}

use Field::{I16, I8, U16, U8};

// Every remote variant starts with the same 14-byte settings block; the
// trailing 7 bytes are variant-specific.
const REMOTE_BASE: [Field; 14] = [U8, U8, U8, U8, U8, I8, U8, U8, U8, U8, U8, U8, U8, U8];

macro_rules! remote_layout {
    ($name:ident[$len:expr], $($tail:expr),+) => {
        const $name: [Field; $len] = {
            let mut layout = [U8; $len];
            let mut i = 0;
            while i < 14 {
                layout[i] = REMOTE_BASE[i];
                i += 1;
            }
            let tail = [$($tail),+];
            let mut j = 0;
            while j < tail.len() {
                layout[14 + j] = tail[j];
                j += 1;
            }
            layout
        };
    };
}

remote_layout!(REMOTE_PLAIN[21], U8, U8, U8, U8, U8, U8, U8);
remote_layout!(REMOTE_BMK[21], I8, I8, I8, I8, U8, U8, U8);
remote_layout!(REMOTE_AGS_RUN[21], U8, U8, U8, I8, U8, U8, U8);
remote_layout!(REMOTE_AGS_SOC[21], I8, I8, U8, U8, U8, U8, U8);
// the log number spans two bytes, so this variant has one field less
remote_layout!(REMOTE_PT_CONTROL[20], I8, I8, I8, I8, U16, U8);
remote_layout!(REMOTE_PT_RELAY[21], U8, U8, I8, I8, I8, I8, U8);
remote_layout!(REMOTE_PT_ALARM[21], U8, U8, I8, I8, U8, I8, U8);
remote_layout!(REMOTE_PT_SETPOINTS[21], U8, U8, U8, U8, U8, I8, U8);

impl PacketType {
    /// The fixed big-endian layout for this packet type. Unpacking is a hard
    /// error when the byte count does not match; `Unknown` has no layout.
    pub fn layout(&self) -> &'static [Field] {
        use PacketType::*;

        match self {
            Unknown => &[],
            Rtr => &[U8, U8],
            AgsStatus => &[U8, I8, U8, I8, U8, U8],
            AgsCounters => &[U8, U8, U8, U16, U8],
            BmkStatus => &[U8, I8, U16, I16, U16, U16, I16, U16, U16, U8, U8],
            Inverter => &[
                U8, U8, I16, I16, U8, U8, I8, I8, U8, U8, U8, U8, U8, U8, U8, U8, I16, I8,
            ],
            PtStatus => &[U8, I8, U8, U8, U16, I16, I16, I8, I8, I8, I8, I8, I8],
            PtRatings => &[U8, I8, U16, U16, U8, U8, U8, U8, U8, U8, U8],
            PtDaily => &[U8, U16, U8, U8, U8, U8, U8, U8, U8, U8, U8, U8, U8],
            PtFaults => &[U8, U8, U8, U8, U8, U8, U8, U8],
            Remote(tag) => match tag {
                RemoteTag::Bmk => &REMOTE_BMK,
                RemoteTag::AgsRun => &REMOTE_AGS_RUN,
                RemoteTag::AgsSoc => &REMOTE_AGS_SOC,
                RemoteTag::PtControl => &REMOTE_PT_CONTROL,
                RemoteTag::PtRelay => &REMOTE_PT_RELAY,
                RemoteTag::PtAlarm => &REMOTE_PT_ALARM,
                RemoteTag::PtSetpoints => &REMOTE_PT_SETPOINTS,
                _ => &REMOTE_PLAIN,
            },
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, PacketType::Remote(_))
    }

    pub fn is_pt100(&self) -> bool {
        matches!(
            self,
            PacketType::PtStatus | PacketType::PtRatings | PacketType::PtDaily | PacketType::PtFaults
        )
    }

    pub fn is_ags(&self) -> bool {
        matches!(self, PacketType::AgsStatus | PacketType::AgsCounters)
    }
}

/// A classified packet: the inferred type, the raw bytes it was built from,
/// and the unpacked integer fields (empty iff the type is `Unknown`).
#[derive(Clone, Debug)]
pub struct Message {
    pub packet_type: PacketType,
    pub bytes: Bytes,
    pub fields: Vec<i32>,
}

/// Identity and scaling state shared across one polling run.
///
/// The first successfully decoded inverter packet latches the inverter's
/// (revision, model) pair, which the classifier needs to tell a genuine
/// inverter status packet apart from a remote packet of identical shape.
/// The model number also fixes the battery-bank voltage multiplier applied
/// by every decoder that reports bank voltages. Until an inverter packet
/// has been seen the multiplier defaults to 1, so 24V/48V systems may
/// briefly publish under-scaled voltages.
#[derive(Clone, Copy, Debug)]
pub struct DecoderContext {
    identity: Option<(u8, u8)>,
    multiplier: u16,
}

impl Default for DecoderContext {
    fn default() -> Self {
        Self {
            identity: None,
            multiplier: 1,
        }
    }
}

impl DecoderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn multiplier(&self) -> f64 {
        f64::from(self.multiplier)
    }

    pub fn identity(&self) -> Option<(u8, u8)> {
        self.identity
    }

    /// Latch the inverter identity; a no-op once set.
    pub fn latch_identity(&mut self, revision: u8, model: u8) {
        if self.identity.is_none() {
            self.identity = Some((revision, model));
        }
    }

    /// Model numbers encode the battery bank class: up to 50 is a 12V
    /// inverter, up to 107 a 24V one, up to 150 a 48V one.
    pub fn set_multiplier_for_model(&mut self, model: u8) {
        if model <= 50 {
            self.multiplier = 1;
        } else if model <= 107 {
            self.multiplier = 2;
        } else if model <= 150 {
            self.multiplier = 4;
        }
    }
}

const SEVEN_ZEROS: [u8; 7] = [0; 7];

/// Infer the packet type from length and boundary bytes.
///
/// The only write to `ctx` is the identity latch when a 21-byte packet is
/// first resolved to the inverter. Classification never fails; anything
/// unrecognized degrades to `Unknown` for fragment recovery to chew on.
pub fn classify(packet: &[u8], ctx: &mut DecoderContext) -> PacketType {
    if packet.is_empty() {
        return PacketType::Unknown;
    }

    let first = packet[0];
    let last = packet[packet.len() - 1];

    match packet.len() {
        2 if first == 0x91 => PacketType::Rtr,
        6 if first == 0xA1 => PacketType::AgsStatus,
        6 if first == 0xA2 => PacketType::AgsCounters,
        8 if first == 0xC4 => PacketType::PtFaults,
        13 if first == 0xC2 => PacketType::PtRatings,
        14 if first == 0xC3 => PacketType::PtDaily,
        16 if first == 0xC1 => PacketType::PtStatus,
        18 if first == 0x81 => PacketType::BmkStatus,
        21 => classify_21(packet, first, last, ctx),
        _ => PacketType::Unknown,
    }
}

// The 21-byte shape is shared by the inverter status packet and every
// remote variant, so this is the one heuristic-heavy case.
fn classify_21(packet: &[u8], first: u8, last: u8, ctx: &mut DecoderContext) -> PacketType {
    let revision = packet[10];
    let model = packet[14];

    if last == 0 {
        // An undocumented remote announcement arrives as seven 0x00 tail
        // bytes; without this check it is indistinguishable from an
        // inverter packet whose status happens to be zero.
        if first == 0 && packet[14..21] == SEVEN_ZEROS {
            return PacketType::Remote(RemoteTag::Base);
        }

        return match ctx.identity() {
            Some(identity) if identity != (revision, model) => {
                PacketType::Remote(RemoteTag::Base)
            }
            Some(_) => PacketType::Inverter,
            None => {
                ctx.latch_identity(revision, model);
                PacketType::Inverter
            }
        };
    }

    match RemoteTag::try_from(last) {
        Ok(tag) => PacketType::Remote(tag),
        Err(_) => PacketType::Unknown,
    }
}

/// Unpack `bytes` through the fixed layout for `packet_type`.
///
/// A size mismatch means the classifier and the layout table disagree, which
/// is a bug, not bad input; it must surface rather than yield a half-decoded
/// record.
pub fn unpack(packet_type: PacketType, bytes: &[u8]) -> Result<Vec<i32>, Error> {
    let layout = packet_type.layout();
    let expected: usize = layout.iter().map(|f| f.width()).sum();
    if expected != bytes.len() {
        return Err(Error::LayoutMismatch {
            packet_type,
            expected,
            actual: bytes.len(),
        });
    }

    let mut fields = Vec::with_capacity(layout.len());
    let mut rest = bytes;
    for field in layout {
        let parsed: nom::IResult<&[u8], i32> = match field {
            Field::U8 => be_u8(rest).map(|(r, v)| (r, i32::from(v))),
            Field::I8 => be_i8(rest).map(|(r, v)| (r, i32::from(v))),
            Field::U16 => be_u16(rest).map(|(r, v)| (r, i32::from(v))),
            Field::I16 => be_i16(rest).map(|(r, v)| (r, i32::from(v))),
        };
        match parsed {
            Ok((r, value)) => {
                rest = r;
                fields.push(value);
            }
            Err(_) => {
                return Err(Error::LayoutMismatch {
                    packet_type,
                    expected,
                    actual: bytes.len(),
                })
            }
        }
    }

    Ok(fields)
}

/// Classify and unpack one raw capture into a `Message`.
///
/// A 22-byte capture is truncated to 21 first; ME-ARC remotes pad some
/// packets with a spurious trailing byte.
pub fn parse(raw: Bytes, ctx: &mut DecoderContext) -> Result<Message, Error> {
    let bytes = if raw.len() == 22 { raw.slice(..21) } else { raw };

    let packet_type = classify(&bytes, ctx);
    let fields = if packet_type == PacketType::Unknown {
        Vec::new()
    } else {
        unpack(packet_type, &bytes)?
    };

    Ok(Message {
        packet_type,
        bytes,
        fields,
    })
}

/// Merge adjacent `Unknown` pairs and retry classification on the joined
/// bytes. A single logical packet occasionally splits across two reads when
/// the silence gap lands inside it; joining the halves recovers it.
///
/// Isolated `Unknown`s pass through unchanged, as does a merge that still
/// fails to classify - there is no recursive re-merging.
pub fn cleanup(messages: Vec<Message>, ctx: &mut DecoderContext) -> Vec<Message> {
    let mut cleaned = Vec::with_capacity(messages.len());
    let mut iter = messages.into_iter().peekable();

    while let Some(message) = iter.next() {
        if message.packet_type != PacketType::Unknown {
            cleaned.push(message);
            continue;
        }

        let next_is_unknown = iter
            .peek()
            .map(|next| next.packet_type == PacketType::Unknown)
            .unwrap_or(false);
        if !next_is_unknown {
            cleaned.push(message);
            continue;
        }

        let next = iter.next().expect("peeked");
        let mut joined = BytesMut::with_capacity(message.bytes.len() + next.bytes.len());
        joined.extend_from_slice(&message.bytes);
        joined.extend_from_slice(&next.bytes);

        match parse(joined.freeze(), ctx) {
            Ok(merged) => cleaned.push(merged),
            Err(err) => {
                error!("discarding unmergeable fragment pair: {}", err);
                cleaned.push(message);
                cleaned.push(next);
            }
        }
    }

    cleaned
}
