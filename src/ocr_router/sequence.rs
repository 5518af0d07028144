//! Orders multi-file inputs into a stable sequence before extraction, using
//! filename numbering when present and falling back to upload order.

use regex::Regex;

#[derive(Debug, Clone)]
pub struct SequencedFile {
    pub original_index: usize,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Sorts files by any leading/trailing numeric run in the filename (e.g.
/// `scan_02.png` before `scan_10.png`); files without a detectable number
/// keep their relative upload order, placed after numbered ones.
pub fn order_files(files: Vec<(String, Vec<u8>)>) -> Vec<SequencedFile> {
    let number_re = Regex::new(r"(\d+)").unwrap();

    let mut sequenced: Vec<SequencedFile> = files
        .into_iter()
        .enumerate()
        .map(|(original_index, (filename, bytes))| SequencedFile { original_index, filename, bytes })
        .collect();

    sequenced.sort_by_key(|f| {
        let number = number_re
            .find_iter(&f.filename)
            .last()
            .and_then(|m| m.as_str().parse::<u64>().ok());
        (number.is_none(), number.unwrap_or(0), f.original_index)
    });

    sequenced
}
