// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifier patching and signature-load-command stripping for a single
//! thin Mach-O slice.
//!
//! Both operations are designed to be size-neutral: stripping the code
//! signature shifts later load commands left and zero-fills the reclaimed
//! space rather than truncating the file, and identifier patching only
//! ever rewrites bytes inside the fixed-size `__TEXT,__info_plist`
//! section. Size-neutral rewriting means a universal/fat wrapper's slice
//! offsets and sizes never need to change, matching the "original
//! offset/size preserved" requirement without having to regenerate the
//! fat header.

use goblin::mach::constants::SEG_LINKEDIT;
use goblin::mach::header::Header;
use goblin::mach::load_command::{CommandVariant, LinkeditDataCommand, LC_CODE_SIGNATURE};
use goblin::mach::parse_magic_and_ctx;
use goblin::mach::MachO;
use scroll::ctx::SizeWith;
use scroll::Pwrite;

use crate::error::{Error, Result};

/// Strip the `LC_CODE_SIGNATURE` load command from a thin Mach-O slice,
/// in place. Returns `true` if a signature was present and stripped.
///
/// The load commands after the stripped one are shifted left by its
/// `cmdsize`, `ncmds`/`sizeofcmds` are decremented, the `__LINKEDIT`
/// segment's declared size shrinks by the signature blob length, and the
/// signature blob bytes themselves are zeroed. The file's total length is
/// unchanged; the external signer will lay its own signature back down
/// over the reclaimed space.
pub fn strip_code_signature(slice: &mut [u8]) -> Result<bool> {
    let macho = MachO::parse(slice, 0)?;
    let ctx = parse_magic_and_ctx(slice, 0)?
        .1
        .expect("context already parsed successfully by MachO::parse");

    let mut signature = None;
    for lc in &macho.load_commands {
        if let CommandVariant::CodeSignature(cmd) = &lc.command {
            signature = Some((lc.offset, lc.command.cmdsize(), *cmd));
        }
    }
    let Some((cmd_offset, cmd_size, sig_cmd)) = signature else {
        return Ok(false);
    };

    let blob_start = sig_cmd.dataoff as usize;
    let blob_end = (blob_start + sig_cmd.datasize as usize).min(slice.len());
    if blob_start <= blob_end && blob_end <= slice.len() {
        for b in &mut slice[blob_start..blob_end] {
            *b = 0;
        }
    }

    let header_size = Header::size_with(&ctx);
    let mut header = macho.header;
    let lc_region_end = header_size + header.sizeofcmds as usize;
    let shift_src_start = cmd_offset + cmd_size;

    if shift_src_start <= lc_region_end && lc_region_end <= slice.len() {
        let shift_len = lc_region_end - shift_src_start;
        slice.copy_within(shift_src_start..shift_src_start + shift_len, cmd_offset);
        for b in &mut slice[cmd_offset + shift_len..lc_region_end] {
            *b = 0;
        }
    }

    header.ncmds -= 1;
    header.sizeofcmds -= cmd_size as u32;
    slice.pwrite_with(header, 0, ctx)?;

    // Re-parse: offsets of commands after the removed one shifted by cmd_size.
    let macho = MachO::parse(slice, 0)?;
    for lc in &macho.load_commands {
        match &lc.command {
            CommandVariant::Segment64(seg) if seg.name() == Ok(SEG_LINKEDIT) => {
                let mut seg = *seg;
                seg.filesize = seg.filesize.saturating_sub(sig_cmd.datasize);
                slice.pwrite_with(seg, lc.offset, ctx.le)?;
            }
            CommandVariant::Segment32(seg) if seg.name() == Ok(SEG_LINKEDIT) => {
                let mut seg = *seg;
                seg.filesize = seg.filesize.saturating_sub(sig_cmd.datasize as u32);
                slice.pwrite_with(seg, lc.offset, ctx.le)?;
            }
            _ => {}
        }
    }

    Ok(true)
}

/// Locate the `(file_offset, size)` of the `__TEXT,__info_plist` section,
/// if the binary embeds one.
fn find_info_plist_section(slice: &[u8]) -> Result<Option<(usize, usize)>> {
    let macho = MachO::parse(slice, 0)?;
    for segment in macho.segments.iter() {
        let Ok(segname) = segment.name() else { continue };
        if segname != "__TEXT" {
            continue;
        }
        let Ok(sections) = segment.sections() else {
            continue;
        };
        for (section, _data) in sections {
            let Ok(sectname) = section.name() else { continue };
            if sectname == "__info_plist" {
                return Ok(Some((section.offset as usize, section.size as usize)));
            }
        }
    }
    Ok(None)
}

/// Replace occurrences of `old_identifier` with `new_identifier` inside
/// the embedded `__TEXT,__info_plist` section only. Returns `true` if the
/// section existed and contained the identifier.
///
/// Fails with [`Error::IdentifierTooLong`] if the new identifier is
/// longer and the section doesn't have enough trailing NUL padding to
/// absorb the growth.
pub fn patch_embedded_identifier(
    slice: &mut [u8],
    old_identifier: &str,
    new_identifier: &str,
) -> Result<bool> {
    let Some((offset, size)) = find_info_plist_section(slice)? else {
        return Ok(false);
    };
    if offset + size > slice.len() {
        return Err(Error::Unsupported(
            "__info_plist section extends past end of file".into(),
        ));
    }

    let section = &mut slice[offset..offset + size];
    patch_section_identifier(section, old_identifier, new_identifier)
}

fn patch_section_identifier(section: &mut [u8], old_id: &str, new_id: &str) -> Result<bool> {
    let old_bytes = old_id.as_bytes();
    let new_bytes = new_id.as_bytes();
    if old_bytes.is_empty() || old_bytes == new_bytes {
        return Ok(false);
    }

    let mut patched = false;
    let mut search_from = 0usize;

    while let Some(rel) = find_subslice(&section[search_from..], old_bytes) {
        let pos = search_from + rel;

        match new_bytes.len().cmp(&old_bytes.len()) {
            std::cmp::Ordering::Equal => {
                section[pos..pos + old_bytes.len()].copy_from_slice(new_bytes);
            }
            std::cmp::Ordering::Less => {
                let delta = old_bytes.len() - new_bytes.len();
                let len = section.len();
                section.copy_within(pos + old_bytes.len()..len, pos + new_bytes.len());
                section[pos..pos + new_bytes.len()].copy_from_slice(new_bytes);
                for b in &mut section[len - delta..] {
                    *b = 0;
                }
            }
            std::cmp::Ordering::Greater => {
                let delta = new_bytes.len() - old_bytes.len();
                let trailing_nul = section.iter().rev().take_while(|&&b| b == 0).count();
                if trailing_nul < delta {
                    return Err(Error::IdentifierTooLong {
                        old: old_id.to_string(),
                        new: new_id.to_string(),
                        old_len: old_bytes.len(),
                        new_len: new_bytes.len(),
                    });
                }
                let len = section.len();
                section.copy_within(pos + old_bytes.len()..len - delta, pos + new_bytes.len());
                section[pos..pos + new_bytes.len()].copy_from_slice(new_bytes);
            }
        }

        patched = true;
        search_from = pos + new_bytes.len();
        if search_from >= section.len() {
            break;
        }
    }

    Ok(patched)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reject any load command that would make this binary unsafe to rewrite
/// size-neutrally (e.g. a Mach-O with no `__TEXT` segment at all).
pub fn check_rewritable(slice: &[u8]) -> Result<()> {
    let macho = MachO::parse(slice, 0)?;
    let has_linkedit = macho
        .segments
        .iter()
        .any(|s| s.name() == Ok(SEG_LINKEDIT));
    if !has_linkedit {
        return Err(Error::MissingLinkedit);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_equal_length_identifier() {
        let mut section = b"com.example.hello\0\0\0\0".to_vec();
        let patched = patch_section_identifier(&mut section, "com.example.hello", "com.acme.hellox").unwrap();
        assert!(patched);
        assert!(section.starts_with(b"com.acme.hellox"));
    }

    #[test]
    fn patch_shorter_identifier_pads_with_nul() {
        let mut section = b"com.example.hello\0\0\0\0".to_vec();
        let original_len = section.len();
        let patched = patch_section_identifier(&mut section, "com.example.hello", "com.a.b").unwrap();
        assert!(patched);
        assert_eq!(section.len(), original_len);
        assert!(section.starts_with(b"com.a.b\0"));
    }

    #[test]
    fn patch_longer_identifier_without_headroom_fails() {
        let mut section = b"com.example.hello".to_vec();
        let err = patch_section_identifier(&mut section, "com.example.hello", "com.example.hello.extra")
            .unwrap_err();
        assert!(matches!(err, Error::IdentifierTooLong { .. }));
    }

    #[test]
    fn patch_longer_identifier_with_headroom_succeeds() {
        let mut section = b"com.example.hello\0\0\0\0\0\0".to_vec();
        let patched =
            patch_section_identifier(&mut section, "com.example.hello", "com.example.hi").unwrap();
        assert!(patched);
        assert!(section.starts_with(b"com.example.hi"));
    }
}
