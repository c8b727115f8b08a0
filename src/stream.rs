// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling common FLAC stream items

use crate::Error;
use crate::metadata::Streaminfo;
use bitstream_io::{BitRead, BitWrite, FromBitStream, FromBitStreamWith, SignedBitCount, ToBitStream};
use std::num::NonZero;

/// A FLAC frame header
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 14   | sync code | always `0b11111111111110` |
/// | 1    | reserved  | always 0 |
/// | 1    | blocking strategy | 0 = fixed, 1 = variable |
/// | 4    | block size | block size in samples |
/// | 4    | sample rate | sample rate in Hz |
/// | 4    | channel assignment | how channels are stored |
/// | 3    | bits-per-sample | size of each sample |
/// | 1    | reserved | always 0 |
/// | 8-56 | frame number | frame or sample number |
/// | 0-16 | uncommon block size | if block size indicates one |
/// | 0-16 | uncommon sample rate | if sample rate indicates one |
/// | 8    | CRC-8 | of all preceding header bytes |
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// Whether the stream uses variable block sizes
    pub blocking_strategy: bool,
    /// The block size, in samples, from 1 to 65536
    pub block_size: u32,
    /// The sample rate, in Hz
    pub sample_rate: u32,
    /// How the channels are assigned
    pub channel_assignment: ChannelAssignment,
    /// The number of bits per output sample
    pub bits_per_sample: SignedBitCount<32>,
    /// The frame's number in the stream
    pub frame_number: FrameNumber,
}

impl FrameHeader {
    const SYNC_CODE: u32 = 0b11111111111110;

    /// Reads new header from the given reader
    ///
    /// # Errors
    ///
    /// Returns an error if any field is invalid, if the
    /// header's CRC-8 does not match its contents, or if
    /// an I/O error occurs when reading the stream.
    pub fn read<R: std::io::Read>(reader: &mut R, streaminfo: &Streaminfo) -> Result<Self, Error> {
        use crate::crc::{Checksum, Crc8, CrcReader};
        use bitstream_io::{BigEndian, BitReader};
        use std::io::Read;

        let mut crc8: CrcReader<_, Crc8> = CrcReader::new(reader);
        BitReader::endian(crc8.by_ref(), BigEndian)
            .parse_with(streaminfo)
            .and_then(|header| {
                crc8.into_checksum()
                    .valid()
                    .then_some(header)
                    .ok_or(Error::Crc8Mismatch)
            })
    }

    /// Returns bits-per-sample for the given channel's subframe
    ///
    /// The difference channel of a stereo pair is stored
    /// with one extra bit.
    pub fn channel_bits_per_sample(&self, channel: usize) -> u32 {
        let bps = u32::from(self.bits_per_sample);
        match (&self.channel_assignment, channel) {
            (ChannelAssignment::LeftSide, 1)
            | (ChannelAssignment::SideRight, 0)
            | (ChannelAssignment::MidSide, 1) => bps + 1,
            _ => bps,
        }
    }
}

impl FromBitStreamWith<'_> for FrameHeader {
    type Error = Error;
    type Context = Streaminfo;

    fn from_reader<R: BitRead + ?Sized>(
        r: &mut R,
        streaminfo: &Streaminfo,
    ) -> Result<Self, Self::Error> {
        r.read_const::<14, { Self::SYNC_CODE }, _>(Error::InvalidSyncCode)?;
        r.read_const::<1, 0, _>(Error::InvalidReservedBit)?;
        let blocking_strategy = r.read_bit()?;
        let encoded_block_size = r.read::<4, u8>()?;
        let encoded_sample_rate = r.read::<4, u8>()?;
        let encoded_channels = r.read::<4, u8>()?;
        let encoded_bps = r.read::<3, u8>()?;
        r.read_const::<1, 0, _>(Error::InvalidReservedBit)?;
        let frame_number = r.parse()?;

        let frame_header = Self {
            blocking_strategy,
            frame_number,
            block_size: match encoded_block_size {
                0b0000 => return Err(Error::InvalidBlockSize),
                0b0001 => 192,
                v @ 0b0010..=0b0101 => 144 * (1 << v),
                0b0110 => u32::from(r.read::<8, u8>()?) + 1,
                0b0111 => u32::from(r.read::<16, u16>()?) + 1,
                v @ 0b1000..=0b1111 => 1 << v,
                _ => unreachable!(), // 4-bit field
            },
            sample_rate: match encoded_sample_rate {
                0b0000 => streaminfo.sample_rate,
                0b0001 => 88200,
                0b0010 => 176400,
                0b0011 => 192000,
                0b0100 => 8000,
                0b0101 => 16000,
                0b0110 => 22050,
                0b0111 => 24000,
                0b1000 => 32000,
                0b1001 => 44100,
                0b1010 => 48000,
                0b1011 => 96000,
                0b1100 => r.read::<8, u32>()? * 1000,
                0b1101 => r.read::<16, _>()?,
                0b1110 => r.read::<16, u32>()? * 10,
                0b1111 => return Err(Error::InvalidSampleRate),
                _ => unreachable!(), // 4-bit field
            },
            channel_assignment: match encoded_channels {
                c @ 0b0000..=0b0111 => ChannelAssignment::Independent(c + 1),
                0b1000 => ChannelAssignment::LeftSide,
                0b1001 => ChannelAssignment::SideRight,
                0b1010 => ChannelAssignment::MidSide,
                0b1011..=0b1111 => return Err(Error::InvalidChannels),
                _ => unreachable!(), // 4-bit field
            },
            bits_per_sample: match encoded_bps {
                0b000 => streaminfo.bits_per_sample,
                0b001 => SignedBitCount::new::<8>(),
                0b010 => SignedBitCount::new::<12>(),
                0b100 => SignedBitCount::new::<16>(),
                0b101 => SignedBitCount::new::<20>(),
                0b110 => SignedBitCount::new::<24>(),
                0b011 | 0b111 => return Err(Error::InvalidBitsPerSample),
                _ => unreachable!(), // 3-bit field
            },
        };

        r.skip(8)?; // CRC-8

        Ok(frame_header)
    }
}

/// How the channels are assigned in a FLAC frame
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ChannelAssignment {
    /// Channels are stored independently
    Independent(u8),
    /// Channel 0 is stored verbatim, channel 1 is the difference
    LeftSide,
    /// Channel 1 is stored verbatim, channel 0 is the difference
    SideRight,
    /// Channel 0 is averaged from both, channel 1 is the difference
    MidSide,
}

impl ChannelAssignment {
    /// Returns total number of channels defined by assignment
    pub fn count(&self) -> u8 {
        match self {
            Self::Independent(c) => *c,
            _ => 2,
        }
    }
}

/// A frame's number in the stream
///
/// With a fixed blocking strategy this is the frame number;
/// with a variable blocking strategy it is the number of the
/// frame's first sample.  Stored as a UTF-8-style value of
/// 1 to 7 bytes, holding up to 36 bits.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameNumber(pub u64);

impl FromBitStream for FrameNumber {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Error> {
        match r.read_unary::<0>()? {
            0 => Ok(Self(r.read::<7, _>()?)),
            1 => Err(Error::InvalidFrameNumber),
            bytes @ 2..=7 => {
                let mut frame = r.read_var(7 - bytes)?;
                for _ in 1..bytes {
                    r.read_const::<2, 0b10, _>(Error::InvalidFrameNumber)?;
                    frame = (frame << 6) | r.read::<6, u64>()?;
                }
                Ok(Self(frame))
            }
            _ => Err(Error::InvalidFrameNumber),
        }
    }
}

impl ToBitStream for FrameNumber {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Error> {
        #[inline]
        fn byte(num: u64, byte: u32) -> u8 {
            0b10_000000 | ((num >> (6 * byte)) & 0b111111) as u8
        }

        match self.0 {
            v @ 0..=0x7F => {
                w.write_unary::<0>(0)?;
                w.write::<7, _>(v)?;
                Ok(())
            }
            v @ 0x80..=0x7FF => {
                w.write_unary::<0>(2)?;
                w.write::<5, _>(v >> 6)?;
                w.write::<8, _>(byte(v, 0))?;
                Ok(())
            }
            v @ 0x800..=0xFFFF => {
                w.write_unary::<0>(3)?;
                w.write::<4, _>(v >> (6 * 2))?;
                w.write::<8, _>(byte(v, 1))?;
                w.write::<8, _>(byte(v, 0))?;
                Ok(())
            }
            v @ 0x1_0000..=0x1F_FFFF => {
                w.write_unary::<0>(4)?;
                w.write::<3, _>(v >> (6 * 3))?;
                w.write::<8, _>(byte(v, 2))?;
                w.write::<8, _>(byte(v, 1))?;
                w.write::<8, _>(byte(v, 0))?;
                Ok(())
            }
            v @ 0x20_0000..=0x3FF_FFFF => {
                w.write_unary::<0>(5)?;
                w.write::<2, _>(v >> (6 * 4))?;
                w.write::<8, _>(byte(v, 3))?;
                w.write::<8, _>(byte(v, 2))?;
                w.write::<8, _>(byte(v, 1))?;
                w.write::<8, _>(byte(v, 0))?;
                Ok(())
            }
            v @ 0x400_0000..=0x7FFF_FFFF => {
                w.write_unary::<0>(6)?;
                w.write::<1, _>(v >> (6 * 5))?;
                w.write::<8, _>(byte(v, 4))?;
                w.write::<8, _>(byte(v, 3))?;
                w.write::<8, _>(byte(v, 2))?;
                w.write::<8, _>(byte(v, 1))?;
                w.write::<8, _>(byte(v, 0))?;
                Ok(())
            }
            v @ 0x8000_0000..=0xF_FFFF_FFFF => {
                w.write_unary::<0>(7)?;
                w.write::<8, _>(byte(v, 5))?;
                w.write::<8, _>(byte(v, 4))?;
                w.write::<8, _>(byte(v, 3))?;
                w.write::<8, _>(byte(v, 2))?;
                w.write::<8, _>(byte(v, 1))?;
                w.write::<8, _>(byte(v, 0))?;
                Ok(())
            }
            _ => Err(Error::InvalidFrameNumber),
        }
    }
}

#[test]
fn test_frame_number() {
    use bitstream_io::{BigEndian, BitReader, BitWriter};

    let mut buf: [u8; 7] = [0; 7];

    for i in (0..=0xFFFF)
        .chain((0x1_0000..=0x1F_FFFF).step_by(32))
        .chain((0x20_0000..=0x3FF_FFFF).step_by(1024))
        .chain((0x400_0000..=0x7FFF_FFFF).step_by(33760))
        .chain((0x8000_0000..=0xF_FFFF_FFFF).step_by(1048592))
    {
        let num = FrameNumber(i);

        assert!(
            BitWriter::endian(buf.as_mut_slice(), BigEndian)
                .build(&num)
                .is_ok()
        );

        let num2 = BitReader::endian(buf.as_slice(), BigEndian)
            .parse::<FrameNumber>()
            .unwrap();

        assert_eq!(num.0, num2.0);

        buf.fill(0);
    }
}

#[test]
fn test_frame_number_table() {
    use bitstream_io::{BigEndian, BitReader};

    // canonical UTF-8-style encodings, including the
    // 5 to 7 byte extensions beyond standard UTF-8
    for (bytes, value) in [
        (&[0x7F][..], 0x7F),
        (&[0xC2, 0xA2][..], 0xA2),
        (&[0xDF, 0xBF][..], 0x7FF),
        (&[0xE2, 0x82, 0xAC][..], 0x20AC),
        (&[0xF0, 0xA4, 0xAD, 0xA2][..], 0x24B62),
        (&[0xF8, 0x88, 0x80, 0x80, 0x80][..], 0x200000),
        (&[0xFD, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF][..], 0x7FFFFFFF),
        (&[0xFE, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF][..], 0xF_FFFF_FFFF),
    ] {
        assert_eq!(
            BitReader::endian(bytes, BigEndian)
                .parse::<FrameNumber>()
                .unwrap(),
            FrameNumber(value),
        );
    }

    // a lone continuation byte is not a valid lead byte
    assert!(matches!(
        BitReader::endian([0x80].as_slice(), BigEndian).parse::<FrameNumber>(),
        Err(Error::InvalidFrameNumber),
    ));

    // lead bytes must be followed by continuation bytes
    assert!(matches!(
        BitReader::endian([0xC2, 0xC2].as_slice(), BigEndian).parse::<FrameNumber>(),
        Err(Error::InvalidFrameNumber),
    ));
}

/// A subframe header
#[derive(Debug)]
pub struct SubframeHeader {
    /// The subframe header's type
    pub type_: SubframeHeaderType,
    /// The number of wasted bits-per-sample
    pub wasted_bps: u32,
}

impl FromBitStream for SubframeHeader {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Error> {
        r.read_const::<1, 0, _>(Error::InvalidSubframeHeader)?;
        Ok(Self {
            type_: r.parse()?,
            wasted_bps: match r.read_bit()? {
                false => 0,
                true => r.read_unary::<1>()? + 1,
            },
        })
    }
}

/// A subframe header's type
#[derive(Debug)]
pub enum SubframeHeaderType {
    /// All samples are the same
    Constant,
    /// All samples are stored verbatim, without compression
    Verbatim,
    /// Samples are stored with one of a set of fixed LPC parameters
    Fixed(&'static [i64]),
    /// Samples are stored with dynamic LPC parameters
    Lpc(NonZero<u8>),
}

impl FromBitStream for SubframeHeaderType {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Error> {
        match r.read::<6, u8>()? {
            0b000000 => Ok(Self::Constant),
            0b000001 => Ok(Self::Verbatim),
            0b001000 => Ok(Self::Fixed(&[])),
            0b001001 => Ok(Self::Fixed(&[1])),
            0b001010 => Ok(Self::Fixed(&[2, -1])),
            0b001011 => Ok(Self::Fixed(&[3, -3, 1])),
            0b001100 => Ok(Self::Fixed(&[4, -6, 4, -1])),
            v @ 0b100000..=0b111111 => Ok(Self::Lpc(NonZero::new(v - 31).unwrap())),
            _ => Err(Error::InvalidSubframeHeaderType),
        }
    }
}
