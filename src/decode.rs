// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For decoding FLAC frames to PCM samples

use crate::Error;
use crate::audio::Frame;
use crate::crc::{Checksum, Crc16, CrcReader};
use crate::metadata::{Block, Streaminfo, VorbisComment, read_blocks};
use crate::stream::{ChannelAssignment, FrameHeader, SubframeHeader, SubframeHeaderType};
use arrayvec::ArrayVec;
use bitstream_io::{BitCount, BitRead, SignedBitCount};
use log::{debug, trace};

const MAX_LPC_ORDER: usize = 32;

/// A FLAC decoder
///
/// Reads a stream's metadata blocks at construction time,
/// then decodes its audio frames one at a time.
///
/// Subframes are decoded into 64-bit intermediate buffers
/// so that the extra bit carried by a difference channel
/// cannot overflow before channels are decorrelated.
pub struct Decoder<R> {
    reader: R,
    streaminfo: Streaminfo,
    vorbis_comment: Option<VorbisComment>,
    frames_read: u64,
    channels: Vec<Vec<i64>>,
}

impl<R: std::io::Read> Decoder<R> {
    /// Builds a new FLAC decoder from the given stream
    ///
    /// This assumes the stream is positioned at the start
    /// of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial FLAC metadata
    /// is invalid or an I/O error occurs reading
    /// the initial metadata.
    pub fn new(mut reader: R) -> Result<Self, Error> {
        use std::io::Read;

        let mut streaminfo = None;
        let mut vorbis_comment = None;

        for block in read_blocks(reader.by_ref()) {
            match block? {
                Block::Streaminfo(s) => {
                    streaminfo = Some(s);
                }
                Block::VorbisComment(v) => {
                    vorbis_comment = Some(v);
                }
                Block::Skipped { block_type, size } => {
                    debug!("skipped {size} byte {block_type} block");
                }
            }
        }

        match streaminfo {
            Some(streaminfo) => Ok(Self {
                reader,
                streaminfo,
                vorbis_comment,
                frames_read: 0,
                channels: Vec::new(),
            }),
            // read_blocks should check for this already
            // but we'll add a second check to be certain
            None => Err(Error::MissingStreaminfo),
        }
    }

    /// Returns the stream's STREAMINFO metadata
    #[inline]
    pub fn streaminfo(&self) -> &Streaminfo {
        &self.streaminfo
    }

    /// Returns the stream's VORBIS_COMMENT metadata, if present
    #[inline]
    pub fn vorbis_comment(&self) -> Option<&VorbisComment> {
        self.vorbis_comment.as_ref()
    }

    /// Returns number of frames successfully decoded so far
    #[inline]
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Reads a whole FLAC frame
    ///
    /// Returns `None` at the end of the stream, which occurs
    /// only when the stream is exhausted at a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs when reading
    /// the stream, or if the stream data is invalid.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        use bitstream_io::{BigEndian, BitReader};
        use std::io::Read;

        // the stream running dry where a sync code should start
        // is an ordinary end of stream, not an error
        let mut sync = [0; 1];
        if self.reader.read(&mut sync)? == 0 {
            return Ok(None);
        }

        let mut crc16: CrcReader<_, Crc16> =
            CrcReader::new(sync.as_slice().chain(self.reader.by_ref()));

        let header = FrameHeader::read(crc16.by_ref(), &self.streaminfo)?;

        debug!(
            "frame {} : {} samples, {} Hz, {:?}",
            self.frames_read, header.block_size, header.sample_rate, header.channel_assignment,
        );

        let block_size = header.block_size as usize;
        self.channels
            .resize_with(header.channel_assignment.count().into(), Vec::new);

        let mut reader = BitReader::endian(crc16.by_ref(), BigEndian);
        for (channel, samples) in self.channels.iter_mut().enumerate() {
            read_subframe(
                &mut reader,
                header.channel_bits_per_sample(channel),
                block_size,
                samples,
            )?;
        }
        reader.byte_align();
        reader.skip(16)?; // CRC-16 checksum

        if !crc16.into_checksum().valid() {
            return Err(Error::Crc16Mismatch);
        }

        decorrelate(&header.channel_assignment, &mut self.channels);

        self.frames_read += 1;

        let mut frame = Frame::new(
            header.sample_rate,
            header.bits_per_sample.into(),
            block_size,
        );
        for channel in &self.channels {
            frame.push_channel(channel.iter().map(|s| *s as i32));
        }
        Ok(Some(frame))
    }
}

fn read_subframe<R: BitRead>(
    reader: &mut R,
    bits_per_sample: u32,
    block_size: usize,
    samples: &mut Vec<i64>,
) -> Result<(), Error> {
    let header: SubframeHeader = reader.parse()?;

    trace!(
        "subframe {:?}, {} wasted bits",
        header.type_, header.wasted_bps,
    );

    let sample_bits: SignedBitCount<33> = bits_per_sample
        .checked_sub(header.wasted_bps)
        .and_then(|bps| BitCount::try_from(bps).ok())
        .and_then(|count| count.signed_count())
        .ok_or(Error::ExcessiveWastedBits)?;

    samples.clear();

    match header.type_ {
        SubframeHeaderType::Constant => {
            let sample = reader.read_signed_counted(sample_bits)?;
            samples.resize(block_size, sample);
        }
        SubframeHeaderType::Verbatim => {
            samples.reserve(block_size);
            for _ in 0..block_size {
                samples.push(reader.read_signed_counted(sample_bits)?);
            }
        }
        SubframeHeaderType::Fixed(coefficients) => {
            read_warm_up(reader, sample_bits, coefficients.len(), samples)?;
            let residuals = read_residuals(reader, block_size, coefficients.len())?;
            predict(coefficients, samples, &residuals, 0);
        }
        SubframeHeaderType::Lpc(order) => {
            let order = usize::from(order.get());
            read_warm_up(reader, sample_bits, order, samples)?;

            let precision = match reader.read::<4, u32>()? {
                0b1111 => return Err(Error::InvalidLpcPrecision),
                p => p + 1,
            };
            let shift = u32::try_from(reader.read_signed::<5, i32>()?)
                .map_err(|_| Error::InvalidLpcShift)?;
            let coefficients = (0..order)
                .map(|_| reader.read_signed_var(precision))
                .collect::<Result<ArrayVec<i64, MAX_LPC_ORDER>, _>>()?;

            trace!("LPC order {order}, precision {precision}, shift {shift}");

            let residuals = read_residuals(reader, block_size, order)?;
            predict(&coefficients, samples, &residuals, shift);
        }
    }

    if header.wasted_bps > 0 {
        samples.iter_mut().for_each(|s| *s <<= header.wasted_bps);
    }

    Ok(())
}

fn read_warm_up<R: BitRead + ?Sized>(
    reader: &mut R,
    sample_bits: SignedBitCount<33>,
    order: usize,
    samples: &mut Vec<i64>,
) -> Result<(), Error> {
    for _ in 0..order {
        samples.push(reader.read_signed_counted(sample_bits)?);
    }
    Ok(())
}

/// Decodes a whole block of Rice-coded residuals
///
/// The block is split into 2 raised to the partition order
/// partitions, each with its own Rice parameter.  The first
/// partition is short by the predictor's order, since that
/// many samples are stored as warm-up values instead.
fn read_residuals<R: BitRead + ?Sized>(
    reader: &mut R,
    block_size: usize,
    predictor_order: usize,
) -> Result<Vec<i64>, Error> {
    let parameter_bits = match reader.read::<2, u8>()? {
        0 => 4,
        1 => 5,
        _ => return Err(Error::InvalidResidualMethod),
    };
    let escape = (1 << parameter_bits) - 1;

    let partition_order = reader.read::<4, u32>()?;
    let partition_count = 1 << partition_order;
    let partition_len = block_size >> partition_order;

    trace!("residual partition order {partition_order}");

    // partitions must divide the block evenly, with room
    // for the warm-up samples in the first partition
    if partition_len << partition_order != block_size || partition_len < predictor_order {
        return Err(Error::InvalidPartitionOrder);
    }

    let mut residuals = Vec::with_capacity(block_size - predictor_order);
    for partition in 0..partition_count {
        let rice = reader.read_var::<u32>(parameter_bits)?;
        if rice == escape {
            return Err(Error::UnsupportedEscapedResiduals);
        }

        let partition_len = match partition {
            0 => partition_len - predictor_order,
            _ => partition_len,
        };

        for _ in 0..partition_len {
            let quotient = u64::from(reader.read_unary::<1>()?);
            let remainder = u64::from(reader.read_var::<u32>(rice)?);
            let value = (quotient << rice) | remainder;
            residuals.push(((value >> 1) as i64) ^ -((value & 1) as i64));
        }
    }
    Ok(residuals)
}

/// Reconstructs a subframe's samples in place from its
/// warm-up samples and residuals
///
/// Each new sample is its residual plus the shifted sum
/// of the coefficients times the previous samples, with
/// the most recent sample weighted by the first coefficient.
fn predict(coefficients: &[i64], samples: &mut Vec<i64>, residuals: &[i64], shift: u32) {
    let order = coefficients.len();
    debug_assert!(samples.len() == order);

    for (i, residual) in residuals.iter().enumerate() {
        let sum: i64 = coefficients
            .iter()
            .zip(samples[..order + i].iter().rev())
            .map(|(c, s)| c * s)
            .sum();
        samples.push(residual + (sum >> shift));
    }
}

/// Rebuilds independent channels from a stereo pair's
/// verbatim and difference channels
fn decorrelate(assignment: &ChannelAssignment, channels: &mut [Vec<i64>]) {
    match assignment {
        ChannelAssignment::Independent(_) => { /* channels are already independent */ }
        ChannelAssignment::LeftSide => {
            if let [left, side] = channels {
                for (l, s) in left.iter().zip(side.iter_mut()) {
                    *s = l - *s;
                }
            }
        }
        ChannelAssignment::SideRight => {
            if let [side, right] = channels {
                for (s, r) in side.iter_mut().zip(right.iter()) {
                    *s += r;
                }
            }
        }
        ChannelAssignment::MidSide => {
            if let [mid, side] = channels {
                for (m, s) in mid.iter_mut().zip(side.iter_mut()) {
                    // the side channel's low bit restores the one
                    // the mid channel's averaging dropped
                    let full = (*m << 1) | (*s & 1);
                    *m = (full + *s) >> 1;
                    *s = (full - *s) >> 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream_io::{BigEndian, BitReader};

    #[test]
    fn test_rice_residuals() {
        // method 0 (4-bit parameters), partition order 0,
        // parameter 2, then 4 values:
        //   "1"   "00" -> 0  ->  0
        //   "1"   "01" -> 1  -> -1
        //   "01"  "11" -> 7  -> -4
        //   "001" "10" -> 10 ->  5
        let data: &[u8] = &[0b00_0000_00, 0b10_100_101, 0b0111_0011, 0b0_0000000];
        let mut r = BitReader::endian(data, BigEndian);

        assert_eq!(
            read_residuals(&mut r, 4, 0).unwrap(),
            vec![0, -1, -4, 5],
        );
    }

    #[test]
    fn test_rice_residuals_partitioned() {
        // method 1 (5-bit parameters), partition order 1,
        // two partitions of 2 over a block size of 4:
        //   parameter 0 : "01", "001"     -> 1, 2 -> -1, 1
        //   parameter 1 : "1"."1", "01"."0" -> 1, 2 -> -1, 1
        let data: &[u8] = &[0b01_0001_00, 0b000_01_001, 0b00001_11_0, 0b10_000000];
        let mut r = BitReader::endian(data, BigEndian);

        assert_eq!(
            read_residuals(&mut r, 4, 0).unwrap(),
            vec![-1, 1, -1, 1],
        );
    }

    #[test]
    fn test_rice_escape() {
        // method 0, partition order 0, all-ones parameter
        let data: &[u8] = &[0b00_0000_11, 0b11_000000];
        let mut r = BitReader::endian(data, BigEndian);

        assert!(matches!(
            read_residuals(&mut r, 4, 0),
            Err(Error::UnsupportedEscapedResiduals),
        ));
    }

    #[test]
    fn test_bad_residual_method() {
        let data: &[u8] = &[0b10_000000];
        let mut r = BitReader::endian(data, BigEndian);

        assert!(matches!(
            read_residuals(&mut r, 4, 0),
            Err(Error::InvalidResidualMethod),
        ));
    }

    #[test]
    fn test_partition_underflow() {
        // partition order 2 over a block size of 4 leaves
        // no room for an order 2 predictor's warm-up samples
        let data: &[u8] = &[0b00_0010_00; 8];
        let mut r = BitReader::endian(data, BigEndian);

        assert!(matches!(
            read_residuals(&mut r, 4, 2),
            Err(Error::InvalidPartitionOrder),
        ));
    }

    #[test]
    fn test_predict_fixed() {
        // order 2 fixed predictor : next = 2a - b + residual
        let mut samples = vec![10, 12];
        predict(&[2, -1], &mut samples, &[1, 0, -2], 0);
        assert_eq!(samples, vec![10, 12, 15, 18, 19]);

        // order 0 passes residuals through untouched
        let mut samples = vec![];
        predict(&[], &mut samples, &[3, -1, 4], 0);
        assert_eq!(samples, vec![3, -1, 4]);
    }

    #[test]
    fn test_predict_shifted() {
        // single coefficient 3 with a shift of 1
        let mut samples = vec![8];
        predict(&[3], &mut samples, &[0, 1], 1);
        // 8 -> (24 >> 1) + 0 = 12 -> (36 >> 1) + 1 = 19
        assert_eq!(samples, vec![8, 12, 19]);

        // arithmetic shift rounds negative sums downward
        let mut samples = vec![-3];
        predict(&[1], &mut samples, &[0], 1);
        assert_eq!(samples, vec![-3, -2]);
    }

    #[test]
    fn test_decorrelate() {
        let left = vec![10, -5, 0, 3];
        let right = vec![7, -9, 2, 3];

        // left/side : channel 1 is left minus right
        let mut channels = vec![
            left.clone(),
            left.iter().zip(&right).map(|(l, r)| l - r).collect(),
        ];
        decorrelate(&ChannelAssignment::LeftSide, &mut channels);
        assert_eq!(channels, vec![left.clone(), right.clone()]);

        // side/right : channel 0 is left minus right
        let mut channels = vec![
            left.iter().zip(&right).map(|(l, r)| l - r).collect(),
            right.clone(),
        ];
        decorrelate(&ChannelAssignment::SideRight, &mut channels);
        assert_eq!(channels, vec![left.clone(), right.clone()]);

        // mid/side : the average channel drops its low bit,
        // which the side channel's low bit restores
        let mut channels = vec![
            left.iter().zip(&right).map(|(l, r)| (l + r) >> 1).collect(),
            left.iter().zip(&right).map(|(l, r)| l - r).collect(),
        ];
        decorrelate(&ChannelAssignment::MidSide, &mut channels);
        assert_eq!(channels, vec![left.clone(), right.clone()]);

        // independent channels pass through untouched
        let mut channels = vec![left.clone(), right.clone()];
        decorrelate(&ChannelAssignment::Independent(2), &mut channels);
        assert_eq!(channels, vec![left, right]);
    }
}
