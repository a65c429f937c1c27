//! Byte-for-byte corruption check after a round trip

use std::io::{self, Write};

/// Every index at which `expected` and `actual` differ
///
/// Indices past the shorter slice count as mismatches.
pub fn mismatches(expected: &[u8], actual: &[u8]) -> Vec<usize> {
    let common = expected.len().min(actual.len());
    let longest = expected.len().max(actual.len());
    expected
        .iter()
        .zip(actual)
        .enumerate()
        .filter(|(_, (e, a))| e != a)
        .map(|(index, _)| index)
        .chain(common..longest)
        .collect()
}

/// Print one `Data corruption` line per index
///
/// # Errors
///
/// Returns any error from the underlying writer.
pub fn report(out: &mut impl Write, indices: &[usize]) -> io::Result<()> {
    for index in indices {
        writeln!(out, "Data corruption : {index}")?;
    }
    Ok(())
}
