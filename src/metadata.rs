// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling a FLAC file's metadata blocks
//!
//! Many items are capitalized simply because they were capitalized
//! in the original FLAC format documentation.
//!
//! FLAC defines seven metadata block types, of which the decoder
//! parses the two it needs and skips over the rest by byte count:
//!
//! | Block Type | Handling |
//! |-----------:|----------|
//! | [STREAMINFO](`Streaminfo`) | parsed; required, and must be first |
//! | PADDING | skipped |
//! | APPLICATION | skipped |
//! | SEEKTABLE | skipped |
//! | [VORBIS_COMMENT](`VorbisComment`) | parsed |
//! | CUESHEET | skipped |
//! | PICTURE | skipped |

use crate::Error;
use bitstream_io::{
    BigEndian, BitRead, BitReader, FromBitStream, LittleEndian, SignedBitCount,
};
use std::num::NonZero;

const FLAC_TAG: &[u8; 4] = b"fLaC";

/// A trait for indicating various pieces of FLAC stream metadata
pub trait Metadata {
    /// Returns channel count
    ///
    /// From 1 to 8
    fn channel_count(&self) -> u8;

    /// Returns sample rate, in Hz
    fn sample_rate(&self) -> u32;

    /// Returns decoder's bits-per-sample
    ///
    /// From 4 to 32
    fn bits_per_sample(&self) -> u32;

    /// Returns total number of channel-independent samples, if known
    fn total_samples(&self) -> Option<u64> {
        None
    }

    /// Returns MD5 of entire stream, if known
    ///
    /// MD5 is always calculated in terms of little-endian,
    /// signed, byte-aligned values.
    fn md5(&self) -> Option<&[u8; 16]> {
        None
    }

    /// Returns duration of file
    fn duration(&self) -> Option<std::time::Duration> {
        const NANOS_PER_SEC: u64 = 1_000_000_000;

        let sample_rate = u64::from(self.sample_rate());

        self.total_samples().map(|s| {
            std::time::Duration::new(
                s / sample_rate,
                u32::try_from(((s % sample_rate) * NANOS_PER_SEC) / sample_rate)
                    .unwrap_or_default(),
            )
        })
    }
}

/// A FLAC metadata block header
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 1    | `last` | final metadata block in file |
/// | 7    | `block_type` | type of block |
/// | 24   | `size` | block size, in bytes |
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use flac_decode::metadata::{BlockHeader, BlockType};
///
/// let data: &[u8] = &[0b1_0000000, 0x00, 0x00, 0x22];
/// let mut r = BitReader::endian(data, BigEndian);
/// assert_eq!(
///     r.parse::<BlockHeader>().unwrap(),
///     BlockHeader {
///         last: true,                         // 0b1
///         block_type: BlockType::Streaminfo,  // 0b0000000
///         size: 0x00_00_22,                   // 0x00, 0x00, 0x22
///     },
/// );
/// ```
#[derive(Debug, Eq, PartialEq)]
pub struct BlockHeader {
    /// Whether we are the final block
    pub last: bool,
    /// Our block type
    pub block_type: BlockType,
    /// Our block size, in bytes
    pub size: u32,
}

impl FromBitStream for BlockHeader {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        Ok(Self {
            last: r.read::<1, _>()?,
            block_type: r.parse()?,
            size: r.read::<24, _>()?,
        })
    }
}

/// A defined FLAC metadata block type
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub enum BlockType {
    /// The STREAMINFO block
    Streaminfo,
    /// The PADDING block
    Padding,
    /// The APPLICATION block
    Application,
    /// The SEEKTABLE block
    SeekTable,
    /// The VORBIS_COMMENT block
    VorbisComment,
    /// The CUESHEET block
    Cuesheet,
    /// The PICTURE block
    Picture,
    /// A reserved block type, from 7 to 126
    Reserved(u8),
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Streaminfo => "STREAMINFO".fmt(f),
            Self::Padding => "PADDING".fmt(f),
            Self::Application => "APPLICATION".fmt(f),
            Self::SeekTable => "SEEKTABLE".fmt(f),
            Self::VorbisComment => "VORBIS_COMMENT".fmt(f),
            Self::Cuesheet => "CUESHEET".fmt(f),
            Self::Picture => "PICTURE".fmt(f),
            Self::Reserved(t) => write!(f, "RESERVED({t})"),
        }
    }
}

impl FromBitStream for BlockType {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        match r.read::<7, u8>()? {
            0 => Ok(Self::Streaminfo),
            1 => Ok(Self::Padding),
            2 => Ok(Self::Application),
            3 => Ok(Self::SeekTable),
            4 => Ok(Self::VorbisComment),
            5 => Ok(Self::Cuesheet),
            6 => Ok(Self::Picture),
            t @ 7..=126 => Ok(Self::Reserved(t)),
            _ => Err(Error::InvalidMetadataBlock),
        }
    }
}

/// A parsed or skipped FLAC metadata block
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Block {
    /// The STREAMINFO block
    Streaminfo(Streaminfo),
    /// The VORBIS_COMMENT block
    VorbisComment(VorbisComment),
    /// Any other block, skipped over by byte count
    Skipped {
        /// The skipped block's type
        block_type: BlockType,
        /// The skipped block's size, in bytes
        size: u32,
    },
}

/// Returns iterator of blocks from the given reader
///
/// The reader should be positioned at the start of the FLAC
/// file.  Iteration ends cleanly after the block whose `last`
/// bit is set, or with an error which fuses the iterator.
///
/// Because this may perform many small reads,
/// using a buffered reader may greatly improve performance
/// when reading from a raw `File`.
///
/// # Example
///
/// ```
/// use flac_decode::metadata::{read_blocks, Block, BlockType};
///
/// let data: &[u8] = &[
///     0x66, 0x4C, 0x61, 0x43,  // "fLaC"
///     0x00, 0x00, 0x00, 0x22,  // STREAMINFO header
///     // STREAMINFO
///     0x00, 0x10, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x0A, 0xC4, 0x42, 0xF0, 0x00, 0x00,
///     0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
///     0x00, 0x00,
///     0x81, 0x00, 0x00, 0x02,  // last block : 2 byte PADDING
///     0x00, 0x00,
/// ];
///
/// let mut blocks = read_blocks(data);
/// assert!(matches!(blocks.next(), Some(Ok(Block::Streaminfo(_)))));
/// assert!(matches!(
///     blocks.next(),
///     Some(Ok(Block::Skipped { block_type: BlockType::Padding, size: 2 })),
/// ));
/// assert!(blocks.next().is_none());
/// ```
pub fn read_blocks<R: std::io::Read>(r: R) -> BlockIterator<R> {
    BlockIterator {
        reader: r,
        tag_read: false,
        streaminfo_read: false,
        vorbiscomment_read: false,
        finished: false,
        failed: false,
    }
}

/// Returns FLAC's STREAMINFO metadata block from the given reader
///
/// The reader is assumed to be rewound to the start of the FLAC
/// file data.
///
/// # Errors
///
/// Returns an error if the STREAMINFO block is not first
/// or if any I/O error occurs when reading the stream.
pub fn read_info<R: std::io::Read>(r: R) -> Result<Streaminfo, Error> {
    let mut r = BitReader::endian(r, BigEndian);

    // FLAC tag must be first thing in stream
    if &r.read_to::<[u8; 4]>()? != FLAC_TAG {
        return Err(Error::MissingFlacTag);
    }

    // STREAMINFO block must be present, and must be first
    match r.parse()? {
        BlockHeader {
            block_type: BlockType::Streaminfo,
            size: Streaminfo::SIZE,
            last: _,
        } => r.parse(),
        _ => Err(Error::MissingStreaminfo),
    }
}

/// An iterator over a FLAC stream's metadata blocks
pub struct BlockIterator<R> {
    reader: R,
    tag_read: bool,
    streaminfo_read: bool,
    vorbiscomment_read: bool,
    finished: bool,
    failed: bool,
}

impl<R: std::io::Read> BlockIterator<R> {
    fn read_block(&mut self) -> Result<Block, Error> {
        use std::io::Read;

        struct LimitedReader<R> {
            reader: R,
            size: usize,
        }

        impl<R: std::io::Read> std::io::Read for LimitedReader<R> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let size = self.size.min(buf.len());
                self.reader.read(&mut buf[0..size]).inspect(|amt_read| {
                    self.size -= amt_read;
                })
            }
        }

        let header: BlockHeader = BitReader::endian(&mut self.reader, BigEndian).parse()?;

        let mut reader = BitReader::endian(
            LimitedReader {
                reader: self.reader.by_ref(),
                size: header.size.try_into().unwrap(),
            },
            BigEndian,
        );

        let block = match header.block_type {
            BlockType::Streaminfo => Block::Streaminfo(reader.parse()?),
            BlockType::VorbisComment => Block::VorbisComment(reader.parse()?),
            block_type => {
                reader.skip(header.size * 8)?;
                Block::Skipped {
                    block_type,
                    size: header.size,
                }
            }
        };

        match reader.into_reader().size {
            0 => {
                self.finished = header.last;
                Ok(block)
            }
            _ => Err(Error::InvalidMetadataBlockSize),
        }
    }
}

impl<R: std::io::Read> Iterator for BlockIterator<R> {
    type Item = Result<Block, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            // once we hit an error, stop any further reads
            None
        } else if !self.tag_read {
            // "fLaC" tag must come before anything else
            let mut tag = [0; 4];
            match self.reader.read_exact(&mut tag) {
                Ok(()) if &tag == FLAC_TAG => {
                    self.tag_read = true;
                    self.next()
                }
                Ok(()) => {
                    self.failed = true;
                    Some(Err(Error::MissingFlacTag))
                }
                Err(err) => {
                    self.failed = true;
                    Some(Err(err.into()))
                }
            }
        } else if self.finished {
            None
        } else if !self.streaminfo_read {
            // STREAMINFO block must be first in file
            match self.read_block() {
                Ok(block @ Block::Streaminfo(_)) => {
                    self.streaminfo_read = true;
                    Some(Ok(block))
                }
                Ok(_) => {
                    self.failed = true;
                    Some(Err(Error::MissingStreaminfo))
                }
                Err(err) => {
                    self.failed = true;
                    Some(Err(err))
                }
            }
        } else {
            match self.read_block() {
                Ok(Block::Streaminfo(_)) => {
                    self.failed = true;
                    Some(Err(Error::MultipleStreaminfo))
                }
                Ok(block @ Block::VorbisComment(_)) => {
                    if !self.vorbiscomment_read {
                        self.vorbiscomment_read = true;
                        Some(Ok(block))
                    } else {
                        self.failed = true;
                        Some(Err(Error::MultipleVorbisComment))
                    }
                }
                Ok(block) => Some(Ok(block)),
                Err(err) => {
                    self.failed = true;
                    Some(Err(err))
                }
            }
        }
    }
}

impl<R: std::io::Read> std::iter::FusedIterator for BlockIterator<R> {}

/// A STREAMINFO metadata block
///
/// This block contains the basic stream parameters needed
/// to decode any frame and must always be present in a
/// FLAC file, as the very first metadata block.
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 16   | `minimum_block_size` | minimum block size, in samples |
/// | 16   | `maximum_block_size` | maximum block size, in samples |
/// | 24   | `minimum_frame_size` | minimum frame size, in bytes |
/// | 24   | `maximum_frame_size` | maximum frame size, in bytes |
/// | 20   | `sample_rate` | sample rate, in Hz |
/// | 3    | `channels` | channel count, minus 1 |
/// | 5    | `bits_per_sample` | bits-per-sample, minus 1 |
/// | 36   | `total_samples` | total inter-channel samples |
/// | 128  | `md5` | MD5 sum of unencoded audio data |
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Streaminfo {
    /// The minimum block size (in samples) used in the stream,
    /// excluding the last block.
    pub minimum_block_size: u16,
    /// The maximum block size (in samples) used in the stream,
    /// excluding the last block.
    pub maximum_block_size: u16,
    /// The minimum frame size (in bytes) used in the stream.
    ///
    /// `None` indicates the value is unknown.
    pub minimum_frame_size: Option<NonZero<u32>>,
    /// The maximum frame size (in bytes) used in the stream.
    ///
    /// `None` indicates the value is unknown.
    pub maximum_frame_size: Option<NonZero<u32>>,
    /// Sample rate in Hz, always greater than 0
    pub sample_rate: u32,
    /// Number of channels, from 1 to 8
    pub channels: NonZero<u8>,
    /// Number of bits-per-sample, from 4 to 32
    pub bits_per_sample: SignedBitCount<32>,
    /// Total number of interchannel samples in stream.
    ///
    /// `None` indicates the value is unknown.
    pub total_samples: Option<NonZero<u64>>,
    /// MD5 hash of unencoded audio data.
    ///
    /// `None` indicates the value is unknown.
    pub md5: Option<[u8; 16]>,
}

impl Streaminfo {
    /// The maximum number of channels (8)
    pub const MAX_CHANNELS: NonZero<u8> = NonZero::new(8).unwrap();

    /// Defined size of STREAMINFO block, in bytes
    pub const SIZE: u32 = 0x22;
}

impl Metadata for Streaminfo {
    fn channel_count(&self) -> u8 {
        self.channels.get()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample.into()
    }

    fn total_samples(&self) -> Option<u64> {
        self.total_samples.map(|s| s.get())
    }

    fn md5(&self) -> Option<&[u8; 16]> {
        self.md5.as_ref()
    }
}

impl FromBitStream for Streaminfo {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        let streaminfo = Self {
            minimum_block_size: r.read_to()?,
            maximum_block_size: r.read_to()?,
            minimum_frame_size: r.read::<24, _>()?,
            maximum_frame_size: r.read::<24, _>()?,
            sample_rate: r.read::<20, _>()?,
            channels: r.read::<3, _>()?,
            bits_per_sample: r
                .read_count::<0b11111>()?
                .checked_add(1)
                .and_then(|c| c.signed_count())
                .unwrap(),
            total_samples: r.read::<36, _>()?,
            md5: r
                .read_to()
                .map(|md5: [u8; 16]| md5.iter().any(|b| *b != 0).then_some(md5))?,
        };

        // a zero sample rate indicates a non-audio stream,
        // which has no frames for us to decode
        if streaminfo.sample_rate == 0 {
            Err(Error::InvalidSampleRate)
        } else if u32::from(streaminfo.bits_per_sample) < 4 {
            Err(Error::InvalidBitsPerSample)
        } else {
            Ok(streaminfo)
        }
    }
}

/// A VORBIS_COMMENT metadata block
///
/// This block contains human-readable textual metadata,
/// also known as FLAC tags.  Each field is a `NAME=value`
/// pair whose contents are stored as a 32-bit little-endian
/// length followed by that many bytes of UTF-8 data.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct VorbisComment {
    /// The vendor string
    pub vendor_string: String,
    /// The individual metadata comment strings
    pub fields: Vec<String>,
}

impl VorbisComment {
    /// Given a field name, returns first matching value, if any
    ///
    /// Fields are matched case-insensitively
    ///
    /// # Example
    ///
    /// ```
    /// use flac_decode::metadata::VorbisComment;
    ///
    /// let comment = VorbisComment {
    ///     fields: vec![
    ///         "ARTIST=Artist 1".to_owned(),
    ///         "ARTIST=Artist 2".to_owned(),
    ///     ],
    ///     ..VorbisComment::default()
    /// };
    ///
    /// assert_eq!(comment.get("ARTIST"), Some("Artist 1"));
    /// assert_eq!(comment.get("TITLE"), None);
    /// ```
    pub fn get(&self, field: &str) -> Option<&str> {
        self.all(field).next()
    }

    /// Given a field name, iterates over any matching values
    ///
    /// Fields are matched case-insensitively
    ///
    /// # Example
    ///
    /// ```
    /// use flac_decode::metadata::VorbisComment;
    ///
    /// let comment = VorbisComment {
    ///     fields: vec![
    ///         "ARTIST=Artist 1".to_owned(),
    ///         "artist=Artist 2".to_owned(),
    ///     ],
    ///     ..VorbisComment::default()
    /// };
    ///
    /// assert_eq!(
    ///     comment.all("ARTIST").collect::<Vec<_>>(),
    ///     vec!["Artist 1", "Artist 2"],
    /// );
    /// ```
    pub fn all(&self, field: &str) -> impl Iterator<Item = &str> {
        assert!(!field.contains('='), "field must not contain '='");

        self.fields.iter().filter_map(|f| {
            f.split_once('=')
                .and_then(|(key, value)| key.eq_ignore_ascii_case(field).then_some(value))
        })
    }
}

impl FromBitStream for VorbisComment {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        fn read_string<R: BitRead + ?Sized>(r: &mut R) -> Result<String, Error> {
            let size = r.read_as_to::<LittleEndian, u32>()?.try_into().unwrap();
            Ok(String::from_utf8(r.read_to_vec(size)?)?)
        }

        Ok(Self {
            vendor_string: read_string(r)?,
            fields: (0..(r.read_as_to::<LittleEndian, u32>()?))
                .map(|_| read_string(r))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}
