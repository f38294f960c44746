use std::io::{Read, Write};

/// Every XDR item occupies a multiple of four bytes.
const XDR_UNIT: usize = 4;

fn padding_len(len: usize) -> usize {
    (XDR_UNIT - len % XDR_UNIT) % XDR_UNIT
}

pub fn read_padding(len: usize, src: &mut impl Read) -> std::io::Result<()> {
    let mut pad = [0_u8; XDR_UNIT];
    src.read_exact(&mut pad[..padding_len(len)])
}

pub fn write_padding(len: usize, dest: &mut impl Write) -> std::io::Result<()> {
    dest.write_all(&[0_u8; XDR_UNIT][..padding_len(len)])
}

pub fn invalid_data(m: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, m)
}
