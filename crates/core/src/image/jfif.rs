//! JFIF APP0 density patch for Kindle renderers that size images by DPI.

pub const DEFAULT_DPI: u16 = 300;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: [u8; 2] = [0xFF, 0xE0];
const JFIF_ID: &[u8; 5] = b"JFIF\0";
/// Density units: dots per inch.
const UNITS_DPI: u8 = 1;

/// Ensure the JPEG in `buf` declares a pixel density.
///
/// Without an APP0 JFIF segment directly after SOI one is inserted declaring
/// `dpi`x`dpi`, and `true` is returned. An existing segment with no density
/// units is updated in place. Applying the patch twice changes nothing the
/// second time. Buffers that are not JPEG are returned unchanged.
pub fn set_jpeg_dpi(mut buf: Vec<u8>, dpi: u16) -> (Vec<u8>, bool) {
    if buf.len() < 2 || buf[..2] != SOI {
        return (buf, false);
    }

    if buf.len() >= 18 && buf[2..4] == APP0 && &buf[6..11] == JFIF_ID {
        // SOI(2) marker(2) length(2) "JFIF\0"(5) version(2) -> units at 13
        if buf[13] == 0 {
            let [hi, lo] = dpi.to_be_bytes();
            buf[13] = UNITS_DPI;
            buf[14..18].copy_from_slice(&[hi, lo, hi, lo]);
        }
        return (buf, false);
    }

    let [hi, lo] = dpi.to_be_bytes();
    let segment: [u8; 18] = [
        0xFF, 0xE0, // APP0
        0x00, 0x10, // length 16
        b'J', b'F', b'I', b'F', 0x00,
        0x01, 0x01, // version 1.1
        UNITS_DPI,
        hi, lo, hi, lo,
        0x00, 0x00, // no thumbnail
    ];
    buf.splice(2..2, segment);
    (buf, true)
}
