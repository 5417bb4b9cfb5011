//! PNG and TIFF predictors for Flate- and LZW-encoded streams.

use crate::error::{Error, Result};
use crate::object::{keys, Dict};
use itertools::izip;
use log::warn;

/// Predictor state for one stream.
///
/// PNG rows carry a leading filter byte and may span chunk boundaries, so a
/// row accumulator persists between writes. TIFF predictor 2 works on whole
/// rows within a single call and carries nothing.
pub(crate) struct Predictor {
    kind: Kind,
    bytes_per_pixel: usize,
    row_len: usize,
    prev_row: Vec<u8>,
    partial: Vec<u8>,
}

#[derive(PartialEq)]
enum Kind {
    Identity,
    Tiff,
    Png,
}

impl Predictor {
    pub(crate) fn from_params(params: Option<&Dict>) -> Self {
        let get = |key: &[u8], default: i64| {
            params
                .and_then(|p| p.get_i64(key))
                .filter(|&v| v > 0)
                .unwrap_or(default)
        };

        let predictor = get(keys::PREDICTOR, 1);
        let colors = get(keys::COLORS, 1) as usize;
        let bits_per_component = get(keys::BITS_PER_COMPONENT, 8) as usize;
        let columns = get(keys::COLUMNS, 1) as usize;

        let kind = match predictor {
            2 => Kind::Tiff,
            10..=15 => Kind::Png,
            _ => Kind::Identity,
        };

        let bytes_per_pixel = (colors * bits_per_component).div_ceil(8).max(1);
        let row_len = (columns * colors * bits_per_component).div_ceil(8);

        Self {
            kind,
            bytes_per_pixel,
            row_len,
            prev_row: vec![0; row_len],
            partial: Vec::new(),
        }
    }

    pub(crate) fn is_identity(&self) -> bool {
        self.kind == Kind::Identity
    }

    /// Decode a chunk of predictor-encoded bytes, appending the result to
    /// `out`.
    pub(crate) fn feed(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match self.kind {
            Kind::Identity => {
                out.extend_from_slice(data);
                Ok(())
            }
            Kind::Tiff => {
                self.feed_tiff(data, out);
                Ok(())
            }
            Kind::Png => self.feed_png(data, out),
        }
    }

    fn feed_tiff(&mut self, data: &[u8], out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(data);

        let bpp = self.bytes_per_pixel;
        for row in out[start..].chunks_exact_mut(self.row_len) {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
    }

    fn feed_png(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.partial.extend_from_slice(data);

        let full_row_len = self.row_len + 1;
        let zero_col = vec![0u8; self.bytes_per_pixel];

        while self.partial.len() >= full_row_len {
            let start = out.len();
            out.resize(start + self.row_len, 0);

            {
                let out_row = &mut out[start..];
                let filter = self.partial[0];
                let in_row = &self.partial[1..full_row_len];
                let bpp = self.bytes_per_pixel;

                match filter {
                    0 => out_row.copy_from_slice(in_row),
                    1 => apply::<Sub>(&self.prev_row, &zero_col, &zero_col, in_row, out_row, bpp),
                    2 => apply::<Up>(&self.prev_row, &zero_col, &zero_col, in_row, out_row, bpp),
                    3 => apply::<Avg>(&self.prev_row, &zero_col, &zero_col, in_row, out_row, bpp),
                    4 => apply::<Paeth>(&self.prev_row, &zero_col, &zero_col, in_row, out_row, bpp),
                    other => {
                        return Err(Error::filter(
                            "predictor",
                            format!("invalid PNG row filter {other}"),
                        ));
                    }
                }
            }

            self.prev_row.copy_from_slice(&out[start..]);
            self.partial.drain(..full_row_len);
        }

        Ok(())
    }

    /// Discard any accumulated partial row at the end of the stream.
    pub(crate) fn finish(&mut self) {
        if !self.partial.is_empty() {
            warn!(
                "dropping {} bytes of an incomplete predictor row",
                self.partial.len()
            );
            self.partial.clear();
        }
    }
}

fn apply<'a, T: Predict>(
    prev_row: &'a [u8],
    mut prev_col: &'a [u8],
    mut top_left: &'a [u8],
    cur_row: &'a [u8],
    out: &'a mut [u8],
    bytes_per_pixel: usize,
) {
    let cur_row = cur_row.chunks_exact(bytes_per_pixel);
    let prev_row = prev_row.chunks_exact(bytes_per_pixel);
    let out_row = out.chunks_exact_mut(bytes_per_pixel);

    for (cur_row, prev_row, out_row) in izip!(cur_row, prev_row, out_row) {
        for (cur_row, prev_row, out_row, prev_col, top_left) in
            izip!(cur_row, prev_row, out_row.iter_mut(), prev_col, top_left)
        {
            *out_row = T::predict(*cur_row, *prev_row, *prev_col, *top_left);
        }

        prev_col = out_row;
        top_left = prev_row;
    }
}

trait Predict {
    fn predict(cur_row: u8, prev_row: u8, prev_col: u8, top_left: u8) -> u8;
}

struct Sub;
impl Predict for Sub {
    fn predict(cur_row: u8, _: u8, prev_col: u8, _: u8) -> u8 {
        cur_row.wrapping_add(prev_col)
    }
}

struct Up;
impl Predict for Up {
    fn predict(cur_row: u8, prev_row: u8, _: u8, _: u8) -> u8 {
        cur_row.wrapping_add(prev_row)
    }
}

struct Avg;
impl Predict for Avg {
    fn predict(cur_row: u8, prev_row: u8, prev_col: u8, _: u8) -> u8 {
        cur_row.wrapping_add(((prev_col as u16 + prev_row as u16) / 2) as u8)
    }
}

struct Paeth;
impl Predict for Paeth {
    fn predict(cur_row: u8, prev_row: u8, prev_col: u8, top_left: u8) -> u8 {
        fn paeth(a: u8, b: u8, c: u8) -> u8 {
            let a = a as i16;
            let b = b as i16;
            let c = c as i16;

            let p = a + b - c;
            let pa = (p - a).abs();
            let pb = (p - b).abs();
            let pc = (p - c).abs();

            if pa <= pb && pa <= pc {
                a as u8
            } else if pb <= pc {
                b as u8
            } else {
                c as u8
            }
        }

        cur_row.wrapping_add(paeth(prev_col, prev_row, top_left))
    }
}

#[cfg(test)]
#[rustfmt::skip]
mod tests {
    use crate::filter::predictor::{Kind, Predictor};

    fn png_predictor(columns: usize, colors: usize) -> Predictor {
        Predictor {
            kind: Kind::Png,
            bytes_per_pixel: colors,
            row_len: columns * colors,
            prev_row: vec![0; columns * colors],
            partial: Vec::new(),
        }
    }

    fn expected() -> Vec<u8> {
        vec![
            // Row 1
            127, 127, 127, 125, 129, 127, 123, 130, 128,
            // Row 2
            128, 129, 126, 126, 132, 124, 121, 127, 126,
            // Row 3
            131, 130, 122, 133, 129, 128, 127, 100, 126,
        ]
    }

    fn png_test(input: &[u8]) {
        // Whole-buffer feed.
        let mut out = Vec::new();
        png_predictor(3, 3).feed(input, &mut out).unwrap();
        assert_eq!(out, expected());

        // Byte-by-byte feed must produce the same rows.
        let mut out = Vec::new();
        let mut predictor = png_predictor(3, 3);
        for b in input {
            predictor.feed(std::slice::from_ref(b), &mut out).unwrap();
        }
        assert_eq!(out, expected());
    }

    #[test]
    fn png_none() {
        let mut input = Vec::new();
        for row in expected().chunks(9) {
            input.push(0);
            input.extend_from_slice(row);
        }
        png_test(&input);
    }

    #[test]
    fn png_sub() {
        png_test(&[
            // Row 1
            1, 127, 127, 127, 254, 2, 0, 254, 1, 1,
            // Row 2
            1, 128, 129, 126, 254, 3, 254, 251, 251, 2,
            // Row 3
            1, 131, 130, 122, 2, 255, 6, 250, 227, 254,
        ]);
    }

    #[test]
    fn png_up() {
        png_test(&[
            // Row 1
            2, 127, 127, 127, 125, 129, 127, 123, 130, 128,
            // Row 2
            2, 1, 2, 255, 1, 3, 253, 254, 253, 254,
            // Row 3
            2, 3, 1, 252, 7, 253, 4, 6, 229, 0,
        ]);
    }

    #[test]
    fn png_avg() {
        png_test(&[
            // Row 1
            3, 127, 127, 127, 62, 66, 64, 61, 66, 65,
            // Row 2
            3, 65, 66, 63, 0, 3, 254, 253, 252, 0,
            // Row 3
            3, 67, 66, 59, 5, 254, 5, 0, 228, 255,
        ]);
    }

    #[test]
    fn png_paeth() {
        png_test(&[
            // Row 1
            4, 127, 127, 127, 254, 2, 0, 254, 1, 1,
            // Row 2
            4, 1, 2, 255, 1, 3, 254, 254, 251, 2,
            // Row 3
            4, 3, 1, 252, 5, 253, 6, 1, 229, 254,
        ]);
    }

    #[test]
    fn tiff_horizontal_differencing() {
        let mut predictor = Predictor {
            kind: Kind::Tiff,
            bytes_per_pixel: 1,
            row_len: 4,
            prev_row: vec![0; 4],
            partial: Vec::new(),
        };

        let mut out = Vec::new();
        predictor.feed(&[10, 1, 2, 3, 20, 5, 5, 5], &mut out).unwrap();
        assert_eq!(out, [10, 11, 13, 16, 20, 25, 30, 35]);
    }
}
