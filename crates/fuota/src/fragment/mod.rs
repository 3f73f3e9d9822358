// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Firmware image fragmentation and forward-error encoding.
//!
//! The [`Fragmenter`] splits an image into `N` equal-size uncoded fragments
//! (the tail is zero-padded) and derives `N` coded fragments by XORing the
//! subsets selected by the deterministic generator matrix in [`matrix`].
//! The on-air sequence is the concatenation `U[0..N]` then `C[0..N]`, `2N`
//! fragments total, addressed by a 1-based wire ordinal.
//!
//! Fragment sizes are fixed per session; the receiver trims the zero padding
//! using the pad count carried in the session setup request.

mod matrix;

pub use matrix::{matrix_line, prbs23};

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Errors raised while building or persisting a fragment set.
#[derive(Debug)]
pub enum FragmentError {
    /// The configured fragment size was zero.
    ZeroFragSize,
    /// The input image was empty.
    EmptyImage,
    /// Writing the fragment set to a sink failed.
    Io(io::Error),
}

impl fmt::Display for FragmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroFragSize => write!(f, "fragment size must be non-zero"),
            Self::EmptyImage => write!(f, "input image is empty"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FragmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FragmentError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Immutable fragment set for one firmware image.
///
/// Constructed once per session from the image bytes and the configured
/// fragment size; every accessor is read-only afterwards.
pub struct Fragmenter {
    frag_size: usize,
    padding: usize,
    uncoded: Vec<Vec<u8>>,
    coded: Vec<Vec<u8>>,
}

impl Fragmenter {
    /// Split `image` into `frag_size`-byte fragments and compute the coded
    /// block.
    ///
    /// The last uncoded fragment is right-padded with zero bytes; the pad
    /// count is retained so the receiver can trim it. Rejects a zero
    /// fragment size and an empty image.
    pub fn new(image: &[u8], frag_size: usize) -> Result<Self, FragmentError> {
        if frag_size == 0 {
            return Err(FragmentError::ZeroFragSize);
        }
        if image.is_empty() {
            return Err(FragmentError::EmptyImage);
        }

        let mut uncoded: Vec<Vec<u8>> = image.chunks(frag_size).map(<[u8]>::to_vec).collect();
        let rem = image.len() % frag_size;
        let padding = if rem == 0 { 0 } else { frag_size - rem };
        if let Some(last) = uncoded.last_mut() {
            last.resize(frag_size, 0);
        }

        let n = uncoded.len();
        log::info!(
            "[FRAG] image {} bytes | fragment size {} | uncoded fragments {} | padding {}",
            image.len(),
            frag_size,
            n,
            padding
        );

        let mut coded = Vec::with_capacity(n);
        for y in 0..n {
            let row = matrix_line(y, n);
            let mut acc = vec![0u8; frag_size];
            for (x, selected) in row.iter().enumerate() {
                if *selected {
                    for (a, b) in acc.iter_mut().zip(&uncoded[x]) {
                        *a ^= *b;
                    }
                }
            }
            log::debug!(
                "[FRAG] row {:03}: {} coefficients",
                y + 1,
                row.iter().filter(|b| **b).count()
            );
            coded.push(acc);
        }

        Ok(Self {
            frag_size,
            padding,
            uncoded,
            coded,
        })
    }

    /// Number of zero bytes appended to the last uncoded fragment.
    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Configured per-fragment payload size in bytes.
    pub fn frag_size(&self) -> usize {
        self.frag_size
    }

    /// Number of uncoded fragments (`N`).
    pub fn uncoded_count(&self) -> usize {
        self.uncoded.len()
    }

    /// Total number of on-air fragments (`2N`, uncoded then coded).
    pub fn total_count(&self) -> usize {
        self.uncoded.len() + self.coded.len()
    }

    /// All fragments in transmission order: `U[0..N]` then `C[0..N]`.
    pub fn fragments(&self) -> impl Iterator<Item = &[u8]> {
        self.uncoded
            .iter()
            .chain(self.coded.iter())
            .map(Vec::as_slice)
    }

    /// Fragment payload for a 1-based wire ordinal, or `None` when out of
    /// range.
    pub fn fragment(&self, ordinal: usize) -> Option<&[u8]> {
        if ordinal == 0 {
            return None;
        }
        let idx = ordinal - 1;
        if idx < self.uncoded.len() {
            Some(&self.uncoded[idx])
        } else {
            self.coded
                .get(idx - self.uncoded.len())
                .map(Vec::as_slice)
        }
    }

    /// Write the concatenation of all fragments (uncoded then coded) to a
    /// byte sink.
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<(), FragmentError> {
        for fragment in self.fragments() {
            sink.write_all(fragment)?;
        }
        Ok(())
    }

    /// Persist the fragment set to the coded sidecar file at `path`.
    pub fn write_sidecar(&self, path: &Path) -> Result<(), FragmentError> {
        let mut file = std::fs::File::create(path)?;
        self.write_to(&mut file)?;
        log::info!(
            "[FRAG] sidecar {} | {} bytes",
            path.display(),
            self.total_count() * self.frag_size
        );
        Ok(())
    }
}

/// Sidecar path for an input image: `files/Input.bin` -> `files/Input_coded.bin`.
pub fn sidecar_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}_coded.{}", stem, ext.to_string_lossy()),
        None => format!("{}_coded", stem),
    };
    input.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_frag_size() {
        assert!(matches!(
            Fragmenter::new(b"abc", 0),
            Err(FragmentError::ZeroFragSize)
        ));
    }

    #[test]
    fn test_rejects_empty_image() {
        assert!(matches!(
            Fragmenter::new(b"", 20),
            Err(FragmentError::EmptyImage)
        ));
    }

    #[test]
    fn test_padding_and_counts() {
        // 45 bytes at 20 bytes/fragment: N = 3, padding = 15, 6 on-air.
        let image = vec![0xA5u8; 45];
        let frag = Fragmenter::new(&image, 20).unwrap();
        assert_eq!(frag.uncoded_count(), 3);
        assert_eq!(frag.total_count(), 6);
        assert_eq!(frag.padding(), 15);
        assert_eq!(frag.fragments().count(), 6);
        for fragment in frag.fragments() {
            assert_eq!(fragment.len(), 20);
        }
    }

    #[test]
    fn test_exact_multiple_has_no_padding() {
        let image = vec![1u8; 40];
        let frag = Fragmenter::new(&image, 20).unwrap();
        assert_eq!(frag.padding(), 0);
        assert_eq!(frag.total_count(), 4);
    }

    #[test]
    fn test_tail_is_zero_padded() {
        let image = [0xFFu8; 25];
        let frag = Fragmenter::new(&image, 20).unwrap();
        let last_uncoded = frag.fragment(2).unwrap();
        assert_eq!(&last_uncoded[..5], &[0xFF; 5]);
        assert_eq!(&last_uncoded[5..], &[0x00; 15]);
    }

    #[test]
    fn test_coded_fragments_match_generator_rows() {
        let image: Vec<u8> = (0u8..=44).collect();
        let frag = Fragmenter::new(&image, 20).unwrap();
        let n = frag.uncoded_count();

        for y in 0..n {
            let row = matrix_line(y, n);
            let mut expected = vec![0u8; 20];
            for (x, selected) in row.iter().enumerate() {
                if *selected {
                    let uncoded = frag.fragment(x + 1).unwrap();
                    for (a, b) in expected.iter_mut().zip(uncoded) {
                        *a ^= *b;
                    }
                }
            }
            assert_eq!(frag.fragment(n + y + 1).unwrap(), expected.as_slice());
        }
    }

    #[test]
    fn test_ordinal_bounds() {
        let frag = Fragmenter::new(&[1, 2, 3], 2).unwrap();
        assert!(frag.fragment(0).is_none());
        assert!(frag.fragment(1).is_some());
        assert!(frag.fragment(4).is_some());
        assert!(frag.fragment(5).is_none());
    }

    #[test]
    fn test_write_to_emits_uncoded_then_coded() {
        let image = [7u8; 30];
        let frag = Fragmenter::new(&image, 20).unwrap();
        let mut out = Vec::new();
        frag.write_to(&mut out).unwrap();
        assert_eq!(out.len(), 4 * 20);
        assert_eq!(&out[..30], &image);
        assert_eq!(&out[30..40], &[0u8; 10]);
    }

    #[test]
    fn test_sidecar_path_naming() {
        assert_eq!(
            sidecar_path(Path::new("files/Input.bin")),
            PathBuf::from("files/Input_coded.bin")
        );
        assert_eq!(
            sidecar_path(Path::new("firmware")),
            PathBuf::from("firmware_coded")
        );
    }

    #[test]
    fn test_write_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image_coded.bin");
        let frag = Fragmenter::new(&[9u8; 10], 4).unwrap();
        frag.write_sidecar(&path).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), 6 * 4);
    }
}
