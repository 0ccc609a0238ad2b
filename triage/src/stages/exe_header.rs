//! Executable header parsing for recognized PE and ELF images.

use async_trait::async_trait;

use super::{Stage, StageContext};
use crate::core::{SampleFormat, StageData};
use crate::errors::StageError;

/// Extracts minimal header facts from PE and ELF images.
///
/// Registered with recognized-executable applicability, so it is skipped for
/// other formats rather than failing on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutableHeaderStage;

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let slice = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    let slice = bytes.get(offset..offset + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Some(u64::from_le_bytes(buf))
}

fn machine_name(machine: u16) -> String {
    match machine {
        0x014c => "x86".to_string(),
        0x8664 => "x64".to_string(),
        0xaa64 => "arm64".to_string(),
        0x01c4 => "arm".to_string(),
        other => format!("{other:#06x}"),
    }
}

fn truncated(what: &str) -> StageError {
    StageError::new("malformed_header", format!("truncated {what} header"))
}

fn parse_pe(bytes: &[u8]) -> Result<StageData, StageError> {
    let pe_offset = read_u32(bytes, 0x3c).ok_or_else(|| truncated("dos"))? as usize;
    if bytes.get(pe_offset..pe_offset + 4) != Some(b"PE\0\0") {
        return Err(StageError::new(
            "malformed_header",
            "missing PE signature".to_string(),
        ));
    }

    let machine = read_u16(bytes, pe_offset + 4).ok_or_else(|| truncated("coff"))?;
    let sections = read_u16(bytes, pe_offset + 6).ok_or_else(|| truncated("coff"))?;
    let timestamp = read_u32(bytes, pe_offset + 8).ok_or_else(|| truncated("coff"))?;

    let mut data = StageData::new();
    data.insert("exe.kind".to_string(), serde_json::json!("pe"));
    data.insert(
        "exe.machine".to_string(),
        serde_json::json!(machine_name(machine)),
    );
    data.insert("exe.sections".to_string(), serde_json::json!(sections));
    data.insert("exe.timestamp".to_string(), serde_json::json!(timestamp));
    Ok(data)
}

fn parse_elf(bytes: &[u8]) -> Result<StageData, StageError> {
    let class = match bytes.get(4) {
        Some(1) => "elf32",
        Some(2) => "elf64",
        _ => {
            return Err(StageError::new(
                "malformed_header",
                "unknown ELF class".to_string(),
            ))
        }
    };
    let machine = read_u16(bytes, 0x12).ok_or_else(|| truncated("elf"))?;
    let entry = if class == "elf64" {
        read_u64(bytes, 0x18).ok_or_else(|| truncated("elf"))?
    } else {
        u64::from(read_u32(bytes, 0x18).ok_or_else(|| truncated("elf"))?)
    };

    let mut data = StageData::new();
    data.insert("exe.kind".to_string(), serde_json::json!("elf"));
    data.insert("exe.class".to_string(), serde_json::json!(class));
    data.insert("exe.machine".to_string(), serde_json::json!(machine));
    data.insert(
        "exe.entry".to_string(),
        serde_json::json!(format!("{entry:#x}")),
    );
    Ok(data)
}

#[async_trait]
impl Stage for ExecutableHeaderStage {
    async fn execute(&self, ctx: &StageContext) -> Result<StageData, StageError> {
        match ctx.metadata().format {
            SampleFormat::Pe => parse_pe(ctx.content()),
            SampleFormat::Elf => parse_elf(ctx.content()),
            other => Err(StageError::new(
                "unsupported_format",
                format!("not an executable image: {other}"),
            )),
        }
    }
}
