// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_decode::Error;
use flac_decode::metadata::{Block, BlockType, Metadata, read_blocks, read_info};
use std::num::NonZero;

// "fLaC", then a lone STREAMINFO block :
// 44100 Hz, 1 channel, 8 bits-per-sample, 16 total samples
const STREAMINFO: &[u8] = &[
    0x66, 0x4C, 0x61, 0x43, 0x80, 0x00, 0x00, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x0A, 0xC4, 0x40, 0x70, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[test]
fn test_streaminfo() {
    let streaminfo = read_info(STREAMINFO).unwrap();

    assert_eq!(streaminfo.minimum_block_size, 0);
    assert_eq!(streaminfo.maximum_block_size, 0);
    assert_eq!(streaminfo.minimum_frame_size, None);
    assert_eq!(streaminfo.maximum_frame_size, None);
    assert_eq!(streaminfo.sample_rate, 44100);
    assert_eq!(streaminfo.channels, NonZero::new(1).unwrap());
    assert_eq!(u32::from(streaminfo.bits_per_sample), 8);
    assert_eq!(streaminfo.total_samples, NonZero::new(16));
    assert_eq!(streaminfo.md5, None);

    // the Metadata trait exposes the same values
    assert_eq!(streaminfo.channel_count(), 1);
    assert_eq!(streaminfo.sample_rate(), 44100);
    assert_eq!(streaminfo.bits_per_sample(), 8);
    assert_eq!(streaminfo.total_samples(), Some(16));
    assert_eq!(streaminfo.md5(), None);
    assert_eq!(
        streaminfo.duration(),
        Some(std::time::Duration::from_nanos(16 * 1_000_000_000 / 44100)),
    );
}

#[test]
fn test_bad_magic() {
    assert!(matches!(
        read_blocks(b"foobar".as_slice()).next(),
        Some(Err(Error::MissingFlacTag)),
    ));

    assert!(matches!(
        read_info(b"foobar".as_slice()),
        Err(Error::MissingFlacTag),
    ));

    // an empty stream has no tag at all
    assert!(matches!(
        read_blocks(b"".as_slice()).next(),
        Some(Err(Error::UnexpectedEof)),
    ));
}

#[test]
fn test_invalid_block_type() {
    // block type 127 is invalid anywhere in the stream
    let data: &[u8] = &[0x66, 0x4C, 0x61, 0x43, 0x7F, 0x00, 0x00, 0x01, 0x00];

    assert!(matches!(
        read_blocks(data).next(),
        Some(Err(Error::InvalidMetadataBlock)),
    ));
}

#[test]
fn test_missing_streaminfo() {
    // last block is a 1 byte PADDING, with no STREAMINFO anywhere
    let data: &[u8] = &[
        0x66, 0x4C, 0x61, 0x43, 0x81, 0x00, 0x00, 0x00, 0x01, 0x00,
    ];

    assert!(matches!(
        read_blocks(data).next(),
        Some(Err(Error::MissingStreaminfo)),
    ));
}

#[test]
fn test_zero_sample_rate() {
    // a STREAMINFO block whose 20-bit sample rate field is 0
    let data: &[u8] = &[
        0x66, 0x4C, 0x61, 0x43, 0x80, 0x00, 0x00, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    assert!(matches!(
        read_blocks(data).next(),
        Some(Err(Error::InvalidSampleRate)),
    ));
}

#[test]
fn test_skipped_blocks() {
    // STREAMINFO (not last), APPLICATION, reserved type 100,
    // then a last PADDING block
    let mut data = STREAMINFO.to_vec();
    data[4] = 0x00; // clear the last flag

    data.extend([0x02, 0x00, 0x00, 0x06]); // APPLICATION
    data.extend(b"abcdef");
    data.extend([0x64, 0x00, 0x00, 0x02]); // reserved type 100
    data.extend([0x55, 0x55]);
    data.extend([0x81, 0x00, 0x00, 0x04]); // last block : PADDING
    data.extend([0x00; 4]);

    let blocks = read_blocks(data.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert!(matches!(blocks[0], Block::Streaminfo(_)));
    assert_eq!(
        blocks[1],
        Block::Skipped {
            block_type: BlockType::Application,
            size: 6,
        },
    );
    assert_eq!(
        blocks[2],
        Block::Skipped {
            block_type: BlockType::Reserved(100),
            size: 2,
        },
    );
    assert_eq!(
        blocks[3],
        Block::Skipped {
            block_type: BlockType::Padding,
            size: 4,
        },
    );
    assert_eq!(blocks.len(), 4);
}

#[test]
fn test_vorbis_comment() {
    let vendor = "test vendor";
    let fields = ["TITLE=Test Title", "ARTIST=Test Artist", "Artist=Second Artist"];

    let mut comment = vec![];
    comment.extend(u32::try_from(vendor.len()).unwrap().to_le_bytes());
    comment.extend(vendor.as_bytes());
    comment.extend(u32::try_from(fields.len()).unwrap().to_le_bytes());
    for field in fields {
        comment.extend(u32::try_from(field.len()).unwrap().to_le_bytes());
        comment.extend(field.as_bytes());
    }

    let mut data = STREAMINFO.to_vec();
    data[4] = 0x00; // clear the last flag
    data.extend([0x84, 0x00, 0x00]);
    data.push(u8::try_from(comment.len()).unwrap());
    data.extend(&comment);

    let blocks = read_blocks(data.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    match &blocks[1] {
        Block::VorbisComment(comment) => {
            assert_eq!(comment.vendor_string, "test vendor");
            assert_eq!(comment.fields.len(), 3);
            assert_eq!(comment.get("TITLE"), Some("Test Title"));
            assert_eq!(comment.get("COMPOSER"), None);
            assert_eq!(
                comment.all("artist").collect::<Vec<_>>(),
                vec!["Test Artist", "Second Artist"],
            );
        }
        block => panic!("expected VORBIS_COMMENT block, got {block:?}"),
    }
}

#[test]
fn test_block_size_mismatch() {
    // a VORBIS_COMMENT block whose declared size is larger
    // than its contents
    let mut data = STREAMINFO.to_vec();
    data[4] = 0x00;
    data.extend([0x84, 0x00, 0x00, 0x20]); // 32 byte VORBIS_COMMENT
    data.extend(4u32.to_le_bytes());
    data.extend(b"test");
    data.extend(0u32.to_le_bytes());
    data.extend([0x00; 20]); // 20 trailing bytes the parse won't consume

    assert!(matches!(
        read_blocks(data.as_slice()).nth(1),
        Some(Err(Error::InvalidMetadataBlockSize)),
    ));
}

#[test]
fn test_multiple_streaminfo() {
    let mut data = STREAMINFO.to_vec();
    data[4] = 0x00;
    data.extend(&STREAMINFO[4..]); // second STREAMINFO block

    assert!(matches!(
        read_blocks(data.as_slice()).nth(1),
        Some(Err(Error::MultipleStreaminfo)),
    ));
}

#[test]
fn test_iterator_fuses_after_error() {
    let mut blocks = read_blocks(b"foobar".as_slice());

    assert!(matches!(blocks.next(), Some(Err(Error::MissingFlacTag))));
    assert!(blocks.next().is_none());
    assert!(blocks.next().is_none());
}
