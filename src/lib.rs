// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A library for decoding FLAC-formatted audio streams
//! to their original PCM samples.
//!
//! A FLAC stream consists of the `fLaC` file tag, one or more
//! metadata blocks, and zero or more audio frames.  Each frame
//! carries one subframe per channel, compressed with either
//! constant/verbatim coding, a fixed predictor, or general LPC,
//! with residuals entropy-coded using Rice codes.
//!
//! The [`decode::Decoder`] type binds all of this together:
//! it consumes the metadata blocks at construction time and
//! then yields one decoded [`audio::Frame`] per call.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod audio;
pub mod crc;
pub mod decode;
pub mod metadata;
pub mod stream;

/// A unified FLAC format error
#[derive(Debug)]
pub enum Error {
    /// A general I/O error from the underlying stream
    Io(std::io::Error),
    /// A UTF-8 formatting error
    Utf8(std::string::FromUtf8Error),
    /// The underlying stream ran out of bytes mid-value
    UnexpectedEof,
    /// A FLAC file missing its initial "fLaC" file tag
    MissingFlacTag,
    /// A FLAC file missing its initial STREAMINFO block
    MissingStreaminfo,
    /// A FLAC file containing multiple STREAMINFO blocks
    MultipleStreaminfo,
    /// A FLAC file containing multiple VORBIS_COMMENT blocks
    MultipleVorbisComment,
    /// An invalid metadata block encountered
    InvalidMetadataBlock,
    /// A metadata block's contents are not the size
    /// indicated in the metadata block header.
    InvalidMetadataBlockSize,
    /// An invalid stream or frame sample rate
    InvalidSampleRate,
    /// An invalid stream or frame bits-per-sample
    InvalidBitsPerSample,
    /// Invalid frame sync code
    InvalidSyncCode,
    /// A non-zero reserved bit in a frame header
    InvalidReservedBit,
    /// Invalid frame block size
    InvalidBlockSize,
    /// Invalid frame channel assignment
    InvalidChannels,
    /// An invalid frame or sample number
    InvalidFrameNumber,
    /// Frame header checksum mismatch
    Crc8Mismatch,
    /// Whole-frame checksum mismatch
    Crc16Mismatch,
    /// An invalid subframe header
    InvalidSubframeHeader,
    /// An invalid subframe header type
    InvalidSubframeHeaderType,
    /// A subframe with more wasted bits than bits-per-sample
    ExcessiveWastedBits,
    /// An invalid LPC coefficient precision
    InvalidLpcPrecision,
    /// A negative LPC quantization shift
    InvalidLpcShift,
    /// An invalid residual coding method
    InvalidResidualMethod,
    /// A residual partition order inconsistent with the frame
    InvalidPartitionOrder,
    /// A residual partition with verbatim (escaped) samples
    UnsupportedEscapedResiduals,
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEof,
            _ => Self::Io(error),
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::Utf8(error)
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::UnexpectedEof => "unexpected end of stream".fmt(f),
            Self::MissingFlacTag => "missing FLAC tag".fmt(f),
            Self::MissingStreaminfo => "STREAMINFO block not first in file".fmt(f),
            Self::MultipleStreaminfo => "multiple STREAMINFO blocks found in file".fmt(f),
            Self::MultipleVorbisComment => "multiple VORBIS_COMMENT blocks found in file".fmt(f),
            Self::InvalidMetadataBlock => "invalid metadata block".fmt(f),
            Self::InvalidMetadataBlockSize => "invalid metadata block size".fmt(f),
            Self::InvalidSampleRate => "invalid sample rate".fmt(f),
            Self::InvalidBitsPerSample => "invalid bits-per-sample".fmt(f),
            Self::InvalidSyncCode => "failed to find the sync code for the next frame".fmt(f),
            Self::InvalidReservedBit => "invalid reserved value in frame header".fmt(f),
            Self::InvalidBlockSize => "invalid frame block size".fmt(f),
            Self::InvalidChannels => "invalid frame channel assignment".fmt(f),
            Self::InvalidFrameNumber => "invalid frame number".fmt(f),
            Self::Crc8Mismatch => "frame header checksum mismatch".fmt(f),
            Self::Crc16Mismatch => "frame checksum mismatch".fmt(f),
            Self::InvalidSubframeHeader => "invalid subframe header".fmt(f),
            Self::InvalidSubframeHeaderType => "invalid subframe header type".fmt(f),
            Self::ExcessiveWastedBits => "excessive wasted bits in subframe".fmt(f),
            Self::InvalidLpcPrecision => "invalid LPC coefficient precision".fmt(f),
            Self::InvalidLpcShift => "invalid LPC quantization shift".fmt(f),
            Self::InvalidResidualMethod => "invalid residual coding method".fmt(f),
            Self::InvalidPartitionOrder => "invalid residual partition order".fmt(f),
            Self::UnsupportedEscapedResiduals => "escaped residuals not supported".fmt(f),
        }
    }
}
