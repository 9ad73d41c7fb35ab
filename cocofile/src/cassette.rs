//! Cassette images.
//!
//! A file on cassette is a 128-byte `$55` leader, a header block, a second
//! leader, one or more data blocks, and an EOF block. Every block is framed
//! `55 3C <type> <length> <payload> <checksum> 55`, where the checksum sums
//! the type, length and payload bytes modulo 256.

use byteorder::{ReadBytesExt, WriteBytesExt};
use log::debug;
use util::Endian;

use crate::{CoCoFile, Container, ContainerError, DataType, FileType};

const LEADER_LEN: usize = 128;
const LEADER_BYTE: u8 = 0x55;
const BLOCK_MAGIC: [u8; 2] = [0x55, 0x3C];
const HEADER_BLOCK: u8 = 0x00;
const DATA_BLOCK: u8 = 0x01;
const EOF_BLOCK: u8 = 0xFF;
const MAX_BLOCK_DATA: usize = 255;

#[derive(Debug, Default)]
pub struct CassetteFile {
    buffer: Vec<u8>,
}

impl CassetteFile {
    pub fn new() -> CassetteFile {
        CassetteFile::default()
    }

    pub fn from_buffer(buffer: Vec<u8>) -> CassetteFile {
        CassetteFile { buffer }
    }

    /// A cassette image begins with a full leader of `$55` bytes.
    pub fn is_correct_type(buffer: &[u8]) -> bool {
        buffer.len() >= LEADER_LEN && buffer[..LEADER_LEN].iter().all(|&b| b == LEADER_BYTE)
    }

    fn write_leader(buffer: &mut Vec<u8>) {
        buffer.extend(std::iter::repeat(LEADER_BYTE).take(LEADER_LEN));
    }

    fn append_header(buffer: &mut Vec<u8>, file: &CoCoFile) -> Result<(), ContainerError> {
        buffer.extend_from_slice(&BLOCK_MAGIC);
        buffer.push(HEADER_BLOCK);
        buffer.push(0x0F);
        let mut checksum = 0x0Fu32;

        for index in 0..8 {
            let byte = file.name.as_bytes().get(index).copied().unwrap_or(0x20);
            buffer.push(byte);
            checksum += u32::from(byte);
        }
        buffer.push(file.file_type as u8);
        buffer.push(file.data_type as u8);
        checksum += file.file_type as u32;
        checksum += file.data_type as u32;

        // No gaps between blocks.
        buffer.push(0x00);

        buffer.write_u16::<Endian>(file.load_addr)?;
        buffer.write_u16::<Endian>(file.exec_addr)?;
        checksum += u32::from(file.load_addr >> 8) + u32::from(file.load_addr & 0xFF);
        checksum += u32::from(file.exec_addr >> 8) + u32::from(file.exec_addr & 0xFF);

        buffer.push((checksum & 0xFF) as u8);
        buffer.push(LEADER_BYTE);
        Ok(())
    }

    fn append_data_blocks(buffer: &mut Vec<u8>, data: &[u8]) {
        for chunk in data.chunks(MAX_BLOCK_DATA) {
            buffer.extend_from_slice(&BLOCK_MAGIC);
            buffer.push(DATA_BLOCK);
            buffer.push(chunk.len() as u8);
            let mut checksum = u32::from(DATA_BLOCK) + chunk.len() as u32;
            for &byte in chunk {
                buffer.push(byte);
                checksum += u32::from(byte);
            }
            buffer.push((checksum & 0xFF) as u8);
            buffer.push(LEADER_BYTE);
        }
    }

    fn append_eof(buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&[0x55, 0x3C, 0xFF, 0x00, 0xFF, 0x55]);
    }

    /// Finds the next block of the wanted type at or after `position`,
    /// returning the offset of the byte following the type marker.
    fn seek_block(&self, position: usize, block_type: u8) -> Option<usize> {
        let pattern = [BLOCK_MAGIC[0], BLOCK_MAGIC[1], block_type];
        self.buffer[position..]
            .windows(pattern.len())
            .position(|window| window == pattern)
            .map(|offset| position + offset + pattern.len())
    }

    /// Reads the file whose header block starts at or after `position`,
    /// returning it along with the offset just past its EOF block.
    fn read_file_at(&self, position: usize) -> Option<(CoCoFile, usize)> {
        let mut cursor = self.seek_block(position, HEADER_BLOCK)?;
        // Length byte, fixed at $0F.
        cursor += 1;

        let name_bytes = self.buffer.get(cursor..cursor + 8)?;
        let name = String::from_utf8_lossy(name_bytes).trim_end().to_string();
        cursor += 8;
        let file_type = FileType::from_byte(*self.buffer.get(cursor)?);
        let data_type = DataType::from_byte(*self.buffer.get(cursor + 1)?);
        let gaps = *self.buffer.get(cursor + 2)? != 0;
        cursor += 3;
        let mut reader = self.buffer.get(cursor..cursor + 4)?;
        let load_addr = reader.read_u16::<Endian>().ok()?;
        let exec_addr = reader.read_u16::<Endian>().ok()?;
        cursor += 4;
        // Checksum and trailing $55.
        cursor += 2;

        let mut data = Vec::new();
        loop {
            let block = self.seek_block(cursor, DATA_BLOCK);
            let eof = self.seek_block(cursor, EOF_BLOCK);
            match (block, eof) {
                (Some(block_start), eof) if eof.map_or(true, |e| block_start < e) => {
                    let length = usize::from(*self.buffer.get(block_start)?);
                    let payload = self.buffer.get(block_start + 1..block_start + 1 + length)?;
                    data.extend_from_slice(payload);
                    cursor = block_start + 1 + length + 2;
                }
                (_, Some(eof_start)) => {
                    // Length, checksum, trailing $55.
                    cursor = eof_start + 3;
                    break;
                }
                _ => {
                    debug!("data or EOF block not found");
                    return None;
                }
            }
        }

        Some((
            CoCoFile {
                name,
                extension: String::new(),
                file_type,
                data_type,
                gaps,
                load_addr,
                exec_addr,
                data,
                ignore_gaps: false,
            },
            cursor,
        ))
    }
}

impl Container for CassetteFile {
    fn list_files(&self) -> Result<Vec<CoCoFile>, ContainerError> {
        let mut files = Vec::new();
        let mut position = 0;
        while let Some((file, next)) = self.read_file_at(position) {
            files.push(file);
            position = next;
        }
        Ok(files)
    }

    fn add_file(&mut self, file: &CoCoFile) -> Result<(), ContainerError> {
        if file.name.is_empty() {
            return Err(ContainerError::Validation(
                "a cassette file requires a program name".to_string(),
            ));
        }
        let mut block = Vec::new();
        Self::write_leader(&mut block);
        Self::append_header(&mut block, file)?;
        Self::write_leader(&mut block);
        Self::append_data_blocks(&mut block, &file.data);
        Self::append_eof(&mut block);
        self.buffer.extend(block);
        Ok(())
    }

    fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}
