mod common;

use common::*;
use mkwebfont_woff2::{
    compress, compute_woff2_final_size, convert_ttf_to_woff2, decompress,
    max_woff2_compressed_size, read_extended_metadata,
    sfnt::{FontCollection, TTC_FLAVOR},
    Tag, Woff2Error, Woff2Params,
};

fn params(brotli_quality: u32, allow_transforms: bool) -> Woff2Params {
    Woff2Params { brotli_quality, allow_transforms, ..Default::default() }
}

/// Compares two fonts table by table, ignoring the `head` fields the encoder rewrites.
fn assert_equivalent(original: &[u8], decoded: &[u8]) {
    let original = FontCollection::parse(original, true).unwrap();
    let decoded = FontCollection::parse(decoded, true).unwrap();
    assert_eq!(original.flavor, decoded.flavor);
    assert_eq!(original.fonts.len(), decoded.fonts.len());
    assert_eq!(original.tables.len(), decoded.tables.len());

    for (original_font, decoded_font) in original.fonts.iter().zip(&decoded.fonts) {
        let tags: Vec<Tag> = original_font.tables.iter().map(|x| x.0).collect();
        let decoded_tags: Vec<Tag> = decoded_font.tables.iter().map(|x| x.0).collect();
        assert_eq!(tags, decoded_tags);

        for tag in tags {
            let a = &original.table(original_font, tag).unwrap().data;
            let b = &decoded.table(decoded_font, tag).unwrap().data;
            if tag == Tag::HEAD {
                // checkSumAdjustment and flags
                assert_eq!(a[..8], b[..8]);
                assert_eq!(a[12..16], b[12..16]);
                assert_eq!(a[18..], b[18..]);
            } else {
                assert_eq!(a, b, "table {tag} differs");
            }
        }
    }
}

#[test]
fn roundtrips_truetype_fonts() {
    for index_to_loc_format in [0, 1] {
        let font = truetype_font(index_to_loc_format);
        for quality in [0, 5, 11] {
            for allow_transforms in [true, false] {
                let woff2 = compress(&font, &params(quality, allow_transforms)).unwrap();
                let decoded = decompress(&woff2).unwrap();
                assert_eq!(compute_woff2_final_size(&woff2).unwrap(), decoded.len());
                assert!(has_valid_file_checksum(&decoded));
                assert_equivalent(&font, &decoded);
            }
        }
    }
}

#[test]
fn roundtrips_collections() {
    let collection = truetype_collection();
    for allow_transforms in [true, false] {
        let woff2 = compress(&collection, &params(11, allow_transforms)).unwrap();
        assert_eq!(u32::from_be_bytes(woff2[4..8].try_into().unwrap()), TTC_FLAVOR);

        let decoded = decompress(&woff2).unwrap();
        assert_eq!(compute_woff2_final_size(&woff2).unwrap(), decoded.len());
        assert_equivalent(&collection, &decoded);
    }
}

#[test]
fn transforms_change_the_layout() {
    let font = truetype_font(1);
    let transformed = compress(&font, &params(11, true)).unwrap();
    let plain = compress(&font, &params(11, false)).unwrap();
    assert_ne!(transformed, plain);
    assert_eq!(decompress(&transformed).unwrap(), decompress(&plain).unwrap());
}

#[test]
fn drops_dsig() {
    let with_dsig = truetype_builder(1)
        .add_table(Tag::DSIG, vec![0, 0, 0, 1, 0, 0, 0, 0])
        .build();

    let decoded = decompress(&compress(&with_dsig, &Woff2Params::default()).unwrap()).unwrap();
    let decoded = FontCollection::parse(&decoded, true).unwrap();
    assert!(decoded.table(&decoded.fonts[0], Tag::DSIG).is_none());
    assert!(decoded.table(&decoded.fonts[0], Tag::GLYF).is_some());
}

#[test]
fn encoding_is_deterministic() {
    let font = truetype_font(0);
    let params = Woff2Params { extended_metadata: b"<metadata/>".to_vec(), ..params(9, true) };
    let first = compress(&font, &params).unwrap();
    for _ in 0..3 {
        assert_eq!(compress(&font, &params).unwrap(), first);
    }
}

#[test]
fn metadata_keeps_embedded_nuls() {
    let font = truetype_font(1);
    let metadata = b"<metadata>\0\0<x/>\0</metadata>".to_vec();
    let params = Woff2Params { extended_metadata: metadata.clone(), ..Default::default() };
    let woff2 = compress(&font, &params).unwrap();
    assert_eq!(read_extended_metadata(&woff2).unwrap(), Some(metadata));

    let plain = compress(&font, &Woff2Params::default()).unwrap();
    assert_eq!(read_extended_metadata(&plain).unwrap(), None);
    assert_eq!(decompress(&woff2).unwrap(), decompress(&plain).unwrap());
}

#[test]
fn size_bound_is_sufficient() {
    let metadata = vec![b'x'; 4000];
    for font in [truetype_font(0), truetype_font(1), truetype_collection()] {
        for allow_transforms in [true, false] {
            let params =
                Woff2Params { extended_metadata: metadata.clone(), ..params(0, allow_transforms) };
            let mut out = vec![0; max_woff2_compressed_size(&font, &metadata)];
            let written = convert_ttf_to_woff2(&font, &mut out, &params).unwrap();
            assert_eq!(out[..written], compress(&font, &params).unwrap());
        }
    }
}

#[test]
fn size_bound_covers_incompressible_tables() {
    let mut state = 0x9E3779B9u32;
    let bitmaps: Vec<u8> = (0..8 << 20)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect();
    let font = mkwebfont_woff2::sfnt::SfntBuilder::new(0x4F54544F)
        .add_table(Tag::HEAD, head_table(0))
        .add_table(Tag::new(b"CBDT"), bitmaps)
        .build();

    for quality in [0, 1, 11] {
        let mut out = vec![0; max_woff2_compressed_size(&font, &[])];
        let written = convert_ttf_to_woff2(&font, &mut out, &params(quality, true));
        assert!(written.is_ok(), "quality {quality}: {written:?}");
    }
}

#[test]
fn insufficient_capacity_fails_without_writing() {
    let font = truetype_font(1);
    let woff2 = compress(&font, &Woff2Params::default()).unwrap();

    let mut exact = vec![0; woff2.len()];
    let written = convert_ttf_to_woff2(&font, &mut exact, &Woff2Params::default()).unwrap();
    assert_eq!(written, woff2.len());
    assert_eq!(exact, woff2);

    let mut short = vec![0x55; woff2.len() - 1];
    let result = convert_ttf_to_woff2(&font, &mut short, &Woff2Params::default());
    assert!(matches!(result, Err(Woff2Error::InsufficientCapacity { .. })));
    assert!(short.iter().all(|x| *x == 0x55));
}

#[test]
fn rejects_malformed_fonts() {
    let font = truetype_font(1);
    let params = Woff2Params::default();

    let mut bad_magic = font.clone();
    bad_magic[..4].copy_from_slice(b"ttcf");
    assert!(compress(&bad_magic, &params).unwrap_err().is_malformed_input());

    for len in [0, 11, 12 + 16 * 3] {
        assert!(compress(&font[..len], &params).unwrap_err().is_malformed_input());
    }

    // point the second table into the middle of the first
    let mut overlapping = font.clone();
    let first_offset = u32::from_be_bytes(overlapping[20..24].try_into().unwrap());
    overlapping[36..40].copy_from_slice(&(first_offset + 4).to_be_bytes());
    assert!(compress(&overlapping, &params).unwrap_err().is_malformed_input());

    let mut corrupt = font.clone();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;
    let error = compress(&corrupt, &params).unwrap_err();
    assert!(matches!(error, Woff2Error::ChecksumMismatch { .. }));

    let lenient = Woff2Params { verify_checksums: false, ..Default::default() };
    assert!(compress(&corrupt, &lenient).is_ok());
}

#[test]
fn rejects_malformed_woff2_files() {
    let woff2 = compress(&truetype_font(1), &Woff2Params::default()).unwrap();

    let mut bad_magic = woff2.clone();
    bad_magic[0] = b'x';
    assert!(decompress(&bad_magic).unwrap_err().is_malformed_input());

    for len in [0, 20, 48, woff2.len() / 2, woff2.len() - 1] {
        assert!(decompress(&woff2[..len]).is_err());
    }

    let mut bad_length = woff2.clone();
    bad_length[8..12].copy_from_slice(&(woff2.len() as u32 + 4).to_be_bytes());
    assert!(decompress(&bad_length).is_err());
}
