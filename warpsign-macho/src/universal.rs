// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dispatch rewriting across thin and universal (fat) Mach-O containers.

use goblin::mach::Mach;

use crate::error::Result;
use crate::rewriter::{check_rewritable, patch_embedded_identifier, strip_code_signature};

/// What happened during a single binary's rewrite.
#[derive(Debug, Default, Clone, Copy)]
pub struct RewriteSummary {
    pub slices_processed: usize,
    pub identifier_patched: bool,
    pub signature_stripped: bool,
}

/// Rewrite `data` in place: strip any embedded code signature and patch
/// the embedded `Info.plist` identifier in every architecture slice
/// (a single slice for a thin binary, one per architecture for a fat
/// binary).
pub fn rewrite_macho(data: &mut [u8], old_identifier: &str, new_identifier: &str) -> Result<RewriteSummary> {
    let mach = Mach::parse(data)?;

    let slice_ranges: Vec<(usize, usize)> = match &mach {
        Mach::Binary(_) => vec![(0, data.len())],
        Mach::Fat(multi) => multi
            .iter_arches()
            .filter_map(|arch| arch.ok())
            .map(|arch| (arch.offset as usize, arch.size as usize))
            .collect(),
    };

    let mut summary = RewriteSummary::default();

    for (offset, size) in slice_ranges {
        if offset + size > data.len() {
            continue;
        }
        let slice = &mut data[offset..offset + size];
        check_rewritable(slice)?;

        if strip_code_signature(slice)? {
            summary.signature_stripped = true;
        }
        if patch_embedded_identifier(slice, old_identifier, new_identifier)? {
            summary.identifier_patched = true;
        }
        summary.slices_processed += 1;
    }

    log::debug!(
        "rewrote {} slice(s): signature_stripped={} identifier_patched={}",
        summary.slices_processed,
        summary.signature_stripped,
        summary.identifier_patched
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_input() {
        let mut data = Vec::new();
        assert!(rewrite_macho(&mut data, "a", "b").is_err());
    }
}
