//! Conflict-free sibling names.

use tree_types::{split_extension, TreeResult};

/// Strip a trailing `" N"` counter (N >= 2) from a base name.
fn strip_counter(base: &str) -> &str {
    match base.rsplit_once(' ') {
        Some((stem, counter))
            if !stem.is_empty()
                && !counter.starts_with('0')
                && counter.parse::<u64>().map(|n| n >= 2).unwrap_or(false) =>
        {
            stem
        }
        _ => base,
    }
}

/// First free name of the form `"base N.ext"`, N counting up from 2.
///
/// `name` itself is returned when it is free. An existing counter is
/// replaced rather than extended, so "Report 2.pdf" colliding yields
/// "Report 3.pdf", not "Report 2 2.pdf".
pub fn next_available_name<F>(name: &str, mut is_taken: F) -> TreeResult<String>
where
    F: FnMut(&str) -> TreeResult<bool>,
{
    if !is_taken(name)? {
        return Ok(name.to_string());
    }

    let (base, ext) = split_extension(name);
    let stem = strip_counter(base);
    let mut counter: u64 = 2;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{} {}.{}", stem, counter, ext),
            None => format!("{} {}", stem, counter),
        };
        if !is_taken(&candidate)? {
            return Ok(candidate);
        }
        counter += 1;
    }
}
