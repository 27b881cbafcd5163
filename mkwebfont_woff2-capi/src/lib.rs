//! C-linkage bindings for `mkwebfont_woff2`, matching the functions declared in
//! `include/woff2.h`.

#![allow(non_snake_case)]

use core::ffi::{c_char, c_int};
use mkwebfont_woff2::{Woff2Error, Woff2Params};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Builds a slice from a pointer and length, accepting a null pointer for an empty span.
unsafe fn byte_span<'a, T>(data: *const T, length: usize) -> &'a [u8] {
    if length == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data as *const u8, length)
    }
}

unsafe fn byte_span_mut<'a>(data: *mut u8, length: usize) -> &'a mut [u8] {
    if length == 0 {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(data, length)
    }
}

/// Runs a conversion, reporting errors and panics as a failure value.
fn guard<T>(name: &str, failure: T, func: impl FnOnce() -> Result<T, Woff2Error>) -> T {
    match catch_unwind(AssertUnwindSafe(func)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("{name} failed: {e}");
            failure
        }
        Err(_) => {
            warn!("{name} panicked");
            failure
        }
    }
}

/// Encodes a font into a caller allocated buffer.
///
/// On entry `*result_length` holds the capacity of `result`. On success it is set to the number
/// of bytes written and 1 is returned. On failure 0 is returned and neither `result` nor
/// `*result_length` is modified.
///
/// # Safety
///
/// `data` must be valid for reads of `length` bytes, `extended_metadata` for reads of
/// `extended_metadata_length` bytes (it may be null when the length is zero), `result` for
/// writes of `*result_length` bytes, and `result_length` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn ConvertTTFToWOFF2(
    data: *const u8,
    length: usize,
    result: *mut u8,
    result_length: *mut usize,
    extended_metadata: *const c_char,
    extended_metadata_length: usize,
    brotli_quality: c_int,
    allow_transforms: c_int,
) -> c_int {
    let font = byte_span(data, length);
    let metadata = byte_span(extended_metadata, extended_metadata_length);
    let out = byte_span_mut(result, *result_length);

    let written = guard("ConvertTTFToWOFF2", None, move || {
        let params = Woff2Params {
            extended_metadata: metadata.to_vec(),
            // negative levels are rejected as out of range
            brotli_quality: brotli_quality.try_into().unwrap_or(u32::MAX),
            allow_transforms: allow_transforms != 0,
            ..Default::default()
        };
        mkwebfont_woff2::convert_ttf_to_woff2(font, out, &params).map(Some)
    });
    match written {
        Some(written) => {
            *result_length = written;
            1
        }
        None => 0,
    }
}

/// Returns an upper bound on the size of the output of [`ConvertTTFToWOFF2`] for a font and
/// metadata.
///
/// # Safety
///
/// `data` must be valid for reads of `length` bytes, and `extended_metadata` for reads of
/// `extended_metadata_length` bytes (it may be null when the length is zero).
#[no_mangle]
pub unsafe extern "C" fn ComputeTTFToWOFF2Size(
    data: *const u8,
    length: usize,
    extended_metadata: *const c_char,
    extended_metadata_length: usize,
) -> usize {
    let font = byte_span(data, length);
    let metadata = byte_span(extended_metadata, extended_metadata_length);
    mkwebfont_woff2::max_woff2_compressed_size(font, metadata)
}

/// Decodes a WOFF2 file into a caller allocated buffer of `result_length` bytes.
///
/// Returns 1 on success and 0 on failure. The size needed can be found with
/// [`ComputeWOFF2ToTTFSize`].
///
/// # Safety
///
/// `data` must be valid for reads of `length` bytes and `result` for writes of `result_length`
/// bytes.
#[no_mangle]
pub unsafe extern "C" fn ConvertWOFF2ToTTF(
    result: *mut u8,
    result_length: usize,
    data: *const u8,
    length: usize,
) -> c_int {
    let woff2 = byte_span(data, length);
    let out = byte_span_mut(result, result_length);
    guard("ConvertWOFF2ToTTF", 0, move || {
        mkwebfont_woff2::convert_woff2_to_ttf(woff2, out).map(|_| 1)
    })
}

/// Returns the size of the font stored in a WOFF2 file, or 0 if its header is invalid.
///
/// # Safety
///
/// `data` must be valid for reads of `length` bytes.
#[no_mangle]
pub unsafe extern "C" fn ComputeWOFF2ToTTFSize(data: *const u8, length: usize) -> usize {
    let woff2 = byte_span(data, length);
    guard("ComputeWOFF2ToTTFSize", 0, move || mkwebfont_woff2::compute_woff2_final_size(woff2))
}
