//! Hand-built sample buffers with just enough structure to parse.

/// A minimal PE image: DOS stub pointing at a COFF header for an x64 binary
/// with 3 sections.
#[must_use]
pub fn pe_sample() -> Vec<u8> {
    let mut bytes = vec![0u8; 0x100];
    bytes[0] = b'M';
    bytes[1] = b'Z';
    // e_lfanew -> COFF header at 0x80
    bytes[0x3c..0x40].copy_from_slice(&0x80u32.to_le_bytes());
    bytes[0x80..0x84].copy_from_slice(b"PE\0\0");
    // IMAGE_FILE_MACHINE_AMD64
    bytes[0x84..0x86].copy_from_slice(&0x8664u16.to_le_bytes());
    bytes[0x86..0x88].copy_from_slice(&3u16.to_le_bytes());
    // link timestamp: 2021-01-01T00:00:00Z
    bytes[0x88..0x8c].copy_from_slice(&1_609_459_200u32.to_le_bytes());
    bytes
}

/// A minimal 64-bit ELF image with entry point `0x401000`.
#[must_use]
pub fn elf_sample() -> Vec<u8> {
    let mut bytes = vec![0u8; 0x40];
    bytes[0..4].copy_from_slice(b"\x7fELF");
    bytes[4] = 2; // ELFCLASS64
    bytes[5] = 1; // little-endian
    // EM_X86_64
    bytes[0x12..0x14].copy_from_slice(&0x3eu16.to_le_bytes());
    bytes[0x18..0x20].copy_from_slice(&0x0040_1000u64.to_le_bytes());
    bytes
}

/// Plain text carrying strings the default signature rules match.
#[must_use]
pub fn text_sample() -> Vec<u8> {
    b"beacon to http://c2.example/gate then spawn cmd.exe /c whoami\0".to_vec()
}
