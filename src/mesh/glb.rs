//! GLB (Binary glTF) container reader and writer.
//!
//! Layout:
//! - 12-byte file header (magic, version 2, total length)
//! - JSON chunk (type 0x4E4F534A, padded to 4-byte alignment with spaces)
//! - BIN chunk (type 0x004E4942, padded to 4-byte alignment with \0)

use std::io::{Cursor, Write};
use std::path::Path;

use anyhow::Context;
use binrw::{binrw, BinRead, BinWrite};
use ::gltf::json as gltf;
use ::gltf::json::accessor::{ComponentType, GenericComponentType, Type};
use ::gltf::json::validation::Checked;

use crate::error::{Result, SnapError};

const GLB_VERSION: u32 = 2;
const GLB_HEADER_SIZE: u32 = 12;
const CHUNK_HEADER_SIZE: u32 = 8;
const CHUNK_TYPE_JSON: u32 = 0x4E4F534A;
const CHUNK_TYPE_BIN: u32 = 0x004E4942;

/// Bytes per decoded vertex (3 x f32).
const VERTEX_SIZE: usize = 12;

#[binrw]
#[derive(Debug, Clone, Copy)]
#[brw(little, magic = b"glTF")]
struct GlbHeader {
    version: u32,
    length: u32,
}

#[binrw]
#[derive(Debug, Clone, Copy)]
#[brw(little)]
struct ChunkHeader {
    length: u32,
    chunk_type: u32,
}

/// Borrowed views of the two chunks of a GLB container.
#[derive(Debug)]
pub struct GlbChunks<'a> {
    pub version: u32,
    pub json: &'a [u8],
    pub bin: &'a [u8],
}

fn chunk_tag(chunk_type: u32) -> String {
    String::from_utf8_lossy(&chunk_type.to_le_bytes())
        .trim_end_matches('\0')
        .to_string()
}

fn read_chunk<'a>(
    data: &'a [u8],
    cursor: &mut Cursor<&'a [u8]>,
    expected: u32,
) -> Result<&'a [u8]> {
    let header = ChunkHeader::read(cursor).map_err(|_| {
        SnapError::Format(format!("missing {} chunk header", chunk_tag(expected)))
    })?;

    if header.chunk_type != expected {
        return Err(SnapError::Format(format!(
            "expected {} chunk, found tag {:?} (0x{:08X})",
            chunk_tag(expected),
            chunk_tag(header.chunk_type),
            header.chunk_type
        )));
    }

    let start = cursor.position() as usize;
    let end = start
        .checked_add(header.length as usize)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            SnapError::Format(format!(
                "{} chunk declares {} bytes but only {} remain",
                chunk_tag(expected),
                header.length,
                data.len().saturating_sub(start)
            ))
        })?;
    cursor.set_position(end as u64);
    Ok(&data[start..end])
}

/// Split a GLB container into its JSON and BIN chunks.
pub fn read_glb(data: &[u8]) -> Result<GlbChunks<'_>> {
    let mut cursor = Cursor::new(data);

    let header = match GlbHeader::read(&mut cursor) {
        Ok(header) => header,
        Err(binrw::Error::BadMagic { .. }) => {
            let found = &data[..data.len().min(4)];
            return Err(SnapError::Format(format!(
                "bad magic {:?}, expected \"glTF\"",
                String::from_utf8_lossy(found)
            )));
        }
        Err(e) => return Err(SnapError::Format(format!("truncated GLB header: {}", e))),
    };

    if header.length as usize > data.len() {
        return Err(SnapError::Format(format!(
            "header declares {} bytes but file holds {}",
            header.length,
            data.len()
        )));
    }

    let json = read_chunk(data, &mut cursor, CHUNK_TYPE_JSON)?;
    let bin = read_chunk(data, &mut cursor, CHUNK_TYPE_BIN)?;

    Ok(GlbChunks {
        version: header.version,
        json,
        bin,
    })
}

/// Decode the first VEC3 float accessor of a GLB into vertex positions.
pub fn decode_positions(chunks: &GlbChunks<'_>) -> Result<Vec<[f32; 3]>> {
    let root = gltf::Root::from_slice(chunks.json)
        .map_err(|e| SnapError::Format(format!("JSON chunk is not a glTF document: {}", e)))?;

    let (accessor_idx, accessor) = root
        .accessors
        .iter()
        .enumerate()
        .find(|(_, a)| {
            matches!(a.type_, Checked::Valid(Type::Vec3))
                && matches!(
                    a.component_type,
                    Checked::Valid(GenericComponentType(ComponentType::F32))
                )
                && a.buffer_view.is_some()
        })
        .ok_or_else(|| SnapError::Decode("no VEC3 float accessor found".to_string()))?;

    let view_idx = accessor
        .buffer_view
        .as_ref()
        .map(|v| v.value())
        .unwrap_or_default();
    let view = root.buffer_views.get(view_idx).ok_or_else(|| {
        SnapError::Decode(format!(
            "accessor {} references missing buffer view {}",
            accessor_idx, view_idx
        ))
    })?;

    if view.buffer.value() != 0 {
        return Err(SnapError::Decode(format!(
            "buffer view {} points at external buffer {}",
            view_idx,
            view.buffer.value()
        )));
    }

    let view_offset = view.byte_offset.map(|o| o.0).unwrap_or(0) as usize;
    let view_length = view.byte_length.0 as usize;
    let accessor_offset = accessor.byte_offset.map(|o| o.0).unwrap_or(0) as usize;
    let stride = view.byte_stride.map(|s| s.0).unwrap_or(VERTEX_SIZE);
    let count = accessor.count.0 as usize;

    if stride < VERTEX_SIZE {
        return Err(SnapError::Decode(format!(
            "byte stride {} is smaller than a vertex",
            stride
        )));
    }
    if count == 0 {
        return Err(SnapError::Decode("position accessor is empty".to_string()));
    }

    let view_end = view_offset.saturating_add(view_length);
    if view_end > chunks.bin.len() {
        return Err(SnapError::Decode(format!(
            "buffer view {} spans {}..{} but BIN chunk holds {} bytes",
            view_idx,
            view_offset,
            view_end,
            chunks.bin.len()
        )));
    }

    let needed = (count - 1)
        .checked_mul(stride)
        .and_then(|n| n.checked_add(accessor_offset.checked_add(VERTEX_SIZE)?));
    match needed {
        Some(n) if n <= view_length => {}
        _ => {
            let available = view_length.saturating_sub(accessor_offset) / stride;
            return Err(SnapError::Decode(format!(
                "accessor declares {} vertices but buffer view holds only {}",
                count, available
            )));
        }
    }

    let data = &chunks.bin[view_offset..view_end];
    let mut positions = Vec::with_capacity(count);
    for i in 0..count {
        let base = accessor_offset + i * stride;
        let read = |at: usize| {
            f32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        };
        positions.push([read(base), read(base + 4), read(base + 8)]);
    }

    Ok(positions)
}

/// Assemble a GLB container in memory.
pub fn encode_glb(json_str: &str, bin_data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let json_bytes = json_str.as_bytes();

    // Pad JSON to 4-byte alignment with spaces (0x20)
    let json_padding = (4 - (json_bytes.len() % 4)) % 4;
    let json_chunk_length = json_bytes.len() + json_padding;

    // Pad BIN to 4-byte alignment with null bytes (0x00)
    let bin_padding = (4 - (bin_data.len() % 4)) % 4;
    let bin_chunk_length = bin_data.len() + bin_padding;

    let total_length = GLB_HEADER_SIZE
        + CHUNK_HEADER_SIZE
        + json_chunk_length as u32
        + CHUNK_HEADER_SIZE
        + bin_chunk_length as u32;

    let mut w = Cursor::new(Vec::with_capacity(total_length as usize));

    GlbHeader {
        version: GLB_VERSION,
        length: total_length,
    }
    .write(&mut w)?;

    ChunkHeader {
        length: json_chunk_length as u32,
        chunk_type: CHUNK_TYPE_JSON,
    }
    .write(&mut w)?;
    w.write_all(json_bytes)?;
    w.write_all(&vec![0x20; json_padding])?;

    ChunkHeader {
        length: bin_chunk_length as u32,
        chunk_type: CHUNK_TYPE_BIN,
    }
    .write(&mut w)?;
    w.write_all(bin_data)?;
    w.write_all(&vec![0x00; bin_padding])?;

    Ok(w.into_inner())
}

/// Write a GLB file from a glTF JSON string and binary buffer.
pub fn write_glb(json_str: &str, bin_data: &[u8], path: &Path) -> anyhow::Result<()> {
    let bytes = encode_glb(json_str, bin_data)?;
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write GLB: {}", path.display()))
}

// ============================================================================
// Tests
// ============================================================================
